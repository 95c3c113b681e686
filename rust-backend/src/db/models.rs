use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use sqlx::FromRow;

/// A symbol whose last price sat outside its monthly value area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ValueAreaResult {
    pub id: Uuid,
    pub symbol: String,
    pub current_price: f64,
    pub vah: f64,
    pub val: f64,
    pub created_at: DateTime<Utc>,
}

impl ValueAreaResult {
    pub fn new(symbol: &str, current_price: f64, vah: f64, val: f64, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            current_price,
            vah,
            val,
            created_at: at,
        }
    }

    pub fn is_above(&self) -> bool {
        self.current_price > self.vah
    }
}
