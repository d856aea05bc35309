// Copyright 2025 Skiff Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Skiff CLI
//!
//! Command-line server and client for the skiff address-book service.
//!
//! The `skiff` binary wires the [`addressbook`] handler into one of the
//! skiff servers and can call it over HTTP:
//!
//! - `skiff serve`: serve the address book over raw TCP (sequential or
//!   thread-per-connection) or over HTTP
//! - `skiff call`: call one method over HTTP and print the outcome as JSON
//!
//! Arguments are parsed with `argh`; everything else lives in
//! `skiff-server` and `skiff-client`.

pub mod addressbook;
