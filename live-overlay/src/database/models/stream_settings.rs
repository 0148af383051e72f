//! Stream settings database model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::ms_to_datetime;

/// One owner's stream configuration. `id` is the stream id.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct StreamSettingsDbModel {
    pub id: i64,
    /// JWT subject of the owning account.
    pub owner_id: String,
    pub rtsp_url: String,
    /// Unix epoch milliseconds (UTC).
    pub created_at: i64,
    /// Unix epoch milliseconds (UTC).
    pub updated_at: i64,
}

impl StreamSettingsDbModel {
    pub fn get_created_at(&self) -> DateTime<Utc> {
        ms_to_datetime(self.created_at)
    }

    pub fn get_updated_at(&self) -> DateTime<Utc> {
        ms_to_datetime(self.updated_at)
    }
}
