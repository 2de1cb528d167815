pub mod im;

// 重新导出常用类型，方便外部使用
pub use im::{
    api::{ChatApi, HttpChatApi},
    channel::{
        ChannelLifecycle, ChannelListener, EventChannel, InboundEvent, MemoryChannel,
        OutboundEvent, WsChannelConfig, WsEventChannel,
    },
    client::{ChatClient, ClientConfig},
    contact::{ContactBook, ContactDetail, ContactSnapshot},
    error::{ChannelError, FetchError, SendError},
    listener::{ConversationListener, EmptyConversationListener},
    message::{Attachment, AttachmentKind, Message, MessageStatus, OutgoingAttachment},
    room::RoomId,
    types::{MessageId, UserId},
};
