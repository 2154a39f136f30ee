pub mod change;
pub mod errors;
pub mod item;
pub mod message;
pub mod timestamp;
pub mod view;

pub use change::{ChangeEvent, StreamErrorEvent, StreamReadyEvent};
pub use errors::{ChannelError, FetchError, MalformedEvent, SyncError};
pub use item::{Item, ItemId, MessagePayload, PartitionKey, SenderProfile, SenderRole};
pub use message::{EditMessageRequest, ListMessagesQuery, MessageListResponse, SendMessageRequest};
pub use timestamp::Timestamp;
pub use view::{CollectionSnapshot, LifecycleState, SyncStatus};
