pub mod content_blobs;
pub mod downloaded_content;
pub mod learning_progress;
pub mod quiz_attempts;
pub mod sync_queue;

// Re-export entities for convenience
pub use content_blobs::{
    ActiveModel as ContentBlobActiveModel, Entity as ContentBlob, Model as ContentBlobModel,
};
pub use downloaded_content::{
    ActiveModel as DownloadedContentActiveModel, Entity as DownloadedContent,
    Model as DownloadedContentModel,
};
pub use learning_progress::{
    ActiveModel as LearningProgressActiveModel, Entity as LearningProgress,
    Model as LearningProgressModel,
};
pub use quiz_attempts::{
    ActiveModel as QuizAttemptActiveModel, Entity as QuizAttemptRow, Model as QuizAttemptModel,
};
pub use sync_queue::{
    ActiveModel as SyncQueueActiveModel, Entity as SyncQueue, Model as SyncQueueModel,
    SyncItemStatus,
};
