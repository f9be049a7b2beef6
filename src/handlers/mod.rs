pub mod asset_handlers;
pub mod health_handlers;
pub mod upload_handlers;

use serde::Serialize;

/// JSON body of every successful API response: `{ "success": true, ... }`.
#[derive(Debug, Serialize)]
pub struct Success<T> {
    pub success: bool,
    #[serde(flatten)]
    pub body: T,
}

impl<T> Success<T> {
    pub fn new(body: T) -> Self {
        Self {
            success: true,
            body,
        }
    }
}
