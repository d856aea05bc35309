//! Binding loosely-typed call arguments onto a method's argument struct.

use serde_json::{Map, Value};

use super::error::{Result, SkiffError};
use super::method::Method;

/// Builds `M::Args` from positional and keyword arguments.
///
/// Positional values bind to the argument fields in declaration order;
/// keyword values bind by field name and override positional ones.
///
/// # Example
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use serde_json::{json, Map};
/// use skiff_common::protocol::{bind_args, Method, NoException};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct MoveArgs { x: i32, y: i32 }
///
/// struct Move;
/// impl Method for Move {
///     const NAME: &'static str = "move";
///     const ARG_FIELDS: &'static [&'static str] = &["x", "y"];
///     type Args = MoveArgs;
///     type Success = ();
///     type Exception = NoException;
/// }
///
/// let mut keyword = Map::new();
/// keyword.insert("y".into(), json!(9));
/// let args = bind_args::<Move>(vec![json!(1), json!(2)], keyword).unwrap();
/// assert_eq!((args.x, args.y), (1, 9));
/// ```
pub fn bind_args<M: Method>(positional: Vec<Value>, keyword: Map<String, Value>) -> Result<M::Args> {
    if positional.len() > M::ARG_FIELDS.len() {
        return Err(SkiffError::InvalidArguments(format!(
            "{}() takes {} positional arguments but {} were given",
            M::NAME,
            M::ARG_FIELDS.len(),
            positional.len()
        )));
    }

    let mut fields: Map<String, Value> = M::ARG_FIELDS
        .iter()
        .zip(positional)
        .map(|(name, value)| (name.to_string(), value))
        .collect();

    for (name, value) in keyword {
        if !M::ARG_FIELDS.contains(&name.as_str()) {
            return Err(SkiffError::InvalidArguments(format!(
                "{}() got an unexpected keyword argument '{}'",
                M::NAME,
                name
            )));
        }
        fields.insert(name, value);
    }

    // Nullary methods take `()`, which only deserializes from null
    if fields.is_empty() {
        if let Ok(args) = serde_json::from_value(Value::Null) {
            return Ok(args);
        }
    }

    serde_json::from_value(Value::Object(fields))
        .map_err(|e| SkiffError::InvalidArguments(format!("{}(): {}", M::NAME, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::NoException;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct GreetArgs {
        name: String,
        #[serde(default)]
        shout: bool,
    }

    struct Greet;

    impl Method for Greet {
        const NAME: &'static str = "greet";
        const ARG_FIELDS: &'static [&'static str] = &["name", "shout"];
        type Args = GreetArgs;
        type Success = String;
        type Exception = NoException;
    }

    #[test]
    fn test_positional_binds_in_order() {
        let args = bind_args::<Greet>(vec![json!("Ken"), json!(true)], Map::new()).unwrap();
        assert_eq!(args, GreetArgs { name: "Ken".into(), shout: true });
    }

    #[test]
    fn test_keyword_overrides_positional() {
        let mut keyword = Map::new();
        keyword.insert("name".into(), json!("Dennis"));
        let args = bind_args::<Greet>(vec![json!("Ken")], keyword).unwrap();
        assert_eq!(args.name, "Dennis");
        assert!(!args.shout);
    }

    #[test]
    fn test_too_many_positional() {
        let result = bind_args::<Greet>(vec![json!("a"), json!(true), json!(3)], Map::new());
        assert!(matches!(result, Err(SkiffError::InvalidArguments(_))));
    }

    #[test]
    fn test_unknown_keyword() {
        let mut keyword = Map::new();
        keyword.insert("volume".into(), json!(11));
        let result = bind_args::<Greet>(vec![json!("a")], keyword);
        assert!(matches!(result, Err(SkiffError::InvalidArguments(msg)) if msg.contains("volume")));
    }

    struct Ping;

    impl Method for Ping {
        const NAME: &'static str = "ping";
        const ARG_FIELDS: &'static [&'static str] = &[];
        const VOID: bool = true;
        type Args = ();
        type Success = ();
        type Exception = NoException;
    }

    #[test]
    fn test_no_arguments_binds_unit() {
        bind_args::<Ping>(vec![], Map::new()).unwrap();

        let result = bind_args::<Ping>(vec![json!(1)], Map::new());
        assert!(matches!(result, Err(SkiffError::InvalidArguments(_))));
    }

    #[test]
    fn test_missing_required_field() {
        let result = bind_args::<Greet>(vec![], Map::new());
        assert!(matches!(result, Err(SkiffError::InvalidArguments(_))));
    }
}
