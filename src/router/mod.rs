//! # Router Module
//!
//! The router resolves a request path to a registered handler by
//! **hierarchical prefix matching**: the longest registered path that is a
//! segment-wise prefix of the request path wins, and the segments beyond it
//! become positional route parameters.
//!
//! ## Overview
//!
//! The router is responsible for:
//! - Holding the route table (`canonical path → handler`), loaded once at startup
//! - Normalizing request paths (trailing slashes, empty path)
//! - Finding the matching route and the ordered parameter list
//!
//! ## Matching Rules
//!
//! 1. The path is normalized: trailing slashes are stripped (except for `/`)
//!    and an empty path becomes `/`.
//! 2. An exact match is tried first.
//! 3. Otherwise the last `/segment` is stripped and the lookup is retried,
//!    until a prefix is found or only one segment is left.
//! 4. `/` is never used as a fallback prefix; it only matches the path `/`.
//!
//! Matching is case-sensitive. Registering the same path twice replaces the
//! earlier handler and logs a warning.
//!
//! ## Example
//!
//! ```rust
//! use anteroom::router::RouteTable;
//!
//! let table = RouteTable::new()
//!     .route("/api/user", |ctx| Ok(format!("user {:?}", ctx.params).into()));
//!
//! let m = table.resolve("/api/user/1337/remove/").unwrap();
//! assert_eq!(&*m.route, "/api/user");
//! assert_eq!(m.params.as_slice(), ["1337", "remove"]);
//! assert!(table.resolve("/other").is_none());
//! ```

mod core;

pub use core::{
    normalize_path, Handler, ParamVec, RouteLoader, RouteMatch, RouteTable, MAX_INLINE_PARAMS,
};
