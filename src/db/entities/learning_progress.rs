use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::ContentType;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "learning_progress")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub content_id: String,
    pub content_type: String,
    /// 0-100.
    pub progress: i32,
    pub completed: bool,
    pub completed_at: Option<DateTime>,
    /// Playback position in seconds, video only.
    pub last_position_secs: Option<f64>,
    pub quiz_completed: bool,
    pub quiz_score: Option<i32>,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn get_content_type(&self) -> Result<ContentType, String> {
        self.content_type.parse()
    }
}
