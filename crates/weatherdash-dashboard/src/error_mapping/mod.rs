//! Maps dashboard service errors to weatherdash_core::AppError for consistent
//! user-facing messages.

mod weather;
