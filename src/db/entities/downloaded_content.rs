use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::ContentType;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "downloaded_content")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub content_id: String,
    pub content_type: String,
    pub downloaded_at: DateTime,
    pub last_accessed: Option<DateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn get_content_type(&self) -> Result<ContentType, String> {
        self.content_type.parse()
    }

    /// Days since this item was last opened, if ever.
    pub fn days_since_accessed(&self) -> Option<i64> {
        self.last_accessed.map(|last| {
            let now = chrono::Utc::now().naive_utc();
            (now - last).num_days()
        })
    }
}
