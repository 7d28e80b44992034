use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct Claims {
    /// Caller email.
    pub sub: String,
    pub role: String,
    pub exp: usize,
}
