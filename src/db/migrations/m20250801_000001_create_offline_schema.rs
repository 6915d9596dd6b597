use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Downloaded content index (offline-readiness markers)
        manager
            .create_table(
                Table::create()
                    .table(DownloadedContent::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DownloadedContent::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DownloadedContent::ContentId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(DownloadedContent::ContentType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DownloadedContent::DownloadedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(DownloadedContent::LastAccessed).timestamp())
                    .to_owned(),
            )
            .await?;

        // Per-item learning progress
        manager
            .create_table(
                Table::create()
                    .table(LearningProgress::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LearningProgress::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(LearningProgress::ContentId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(LearningProgress::ContentType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(LearningProgress::Progress)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(LearningProgress::Completed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(LearningProgress::CompletedAt).timestamp())
                    .col(ColumnDef::new(LearningProgress::LastPositionSecs).double())
                    .col(
                        ColumnDef::new(LearningProgress::QuizCompleted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(LearningProgress::QuizScore).integer())
                    .col(
                        ColumnDef::new(LearningProgress::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Append-only quiz attempt history
        manager
            .create_table(
                Table::create()
                    .table(QuizAttempts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(QuizAttempts::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(QuizAttempts::AttemptId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(QuizAttempts::QuizId).string().not_null())
                    .col(ColumnDef::new(QuizAttempts::Answers).text().not_null())
                    .col(ColumnDef::new(QuizAttempts::Score).integer().not_null())
                    .col(ColumnDef::new(QuizAttempts::Passed).boolean().not_null())
                    .col(
                        ColumnDef::new(QuizAttempts::CompletedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_quiz_attempts_quiz")
                    .table(QuizAttempts::Table)
                    .col(QuizAttempts::QuizId)
                    .to_owned(),
            )
            .await?;

        // Pending remote mutations
        manager
            .create_table(
                Table::create()
                    .table(SyncQueue::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncQueue::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SyncQueue::Action).string().not_null())
                    .col(ColumnDef::new(SyncQueue::Payload).text().not_null())
                    .col(
                        ColumnDef::new(SyncQueue::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(SyncQueue::LastAttemptAt).timestamp())
                    .col(
                        ColumnDef::new(SyncQueue::AttemptCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(SyncQueue::ErrorMessage).string())
                    .col(
                        ColumnDef::new(SyncQueue::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sync_queue_status")
                    .table(SyncQueue::Table)
                    .col(SyncQueue::Status)
                    .to_owned(),
            )
            .await?;

        // Composite index for efficient pending queue queries
        manager
            .create_index(
                Index::create()
                    .name("idx_sync_queue_status_created")
                    .table(SyncQueue::Table)
                    .col(SyncQueue::Status)
                    .col(SyncQueue::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // Binary payloads for the database-backed blob store
        manager
            .create_table(
                Table::create()
                    .table(ContentBlobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ContentBlobs::ContentId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ContentBlobs::Data).blob().not_null())
                    .col(
                        ColumnDef::new(ContentBlobs::SizeBytes)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ContentBlobs::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ContentBlobs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SyncQueue::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(QuizAttempts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(LearningProgress::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DownloadedContent::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum DownloadedContent {
    Table,
    Id,
    ContentId,
    ContentType,
    DownloadedAt,
    LastAccessed,
}

#[derive(DeriveIden)]
enum LearningProgress {
    Table,
    Id,
    ContentId,
    ContentType,
    Progress,
    Completed,
    CompletedAt,
    LastPositionSecs,
    QuizCompleted,
    QuizScore,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum QuizAttempts {
    Table,
    Id,
    AttemptId,
    QuizId,
    Answers,
    Score,
    Passed,
    CompletedAt,
}

#[derive(DeriveIden)]
enum SyncQueue {
    Table,
    Id,
    Action,
    Payload,
    CreatedAt,
    LastAttemptAt,
    AttemptCount,
    ErrorMessage,
    Status,
}

#[derive(DeriveIden)]
enum ContentBlobs {
    Table,
    ContentId,
    Data,
    SizeBytes,
    UpdatedAt,
}
