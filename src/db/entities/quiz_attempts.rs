use anyhow::{Context, Result};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::{QuizAttempt, QuizId};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "quiz_attempts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub attempt_id: String,
    pub quiz_id: String,
    /// JSON array, index-aligned to the quiz questions.
    pub answers: String,
    /// 0-100.
    pub score: i32,
    pub passed: bool,
    pub completed_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Decode the row into the domain attempt type.
    pub fn to_attempt(&self) -> Result<QuizAttempt> {
        let answers: Vec<String> =
            serde_json::from_str(&self.answers).context("Failed to parse stored quiz answers")?;

        Ok(QuizAttempt {
            id: self.attempt_id.clone(),
            quiz_id: QuizId::new(self.quiz_id.clone()),
            answers,
            score: self.score.clamp(0, 100) as u8,
            passed: self.passed,
            completed_at: self.completed_at.and_utc(),
        })
    }
}
