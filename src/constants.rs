//! Shared key and parameter names.

/// Binding key used when an application talks to a single database
pub const DEFAULT_KEY: &str = "sm_main";

/// Path parameter carrying a unit view's primary key
pub const PK_PARAM: &str = "pk";

/// Query parameter carrying the requested page number
pub const PAGE_PARAM: &str = "page_key";
