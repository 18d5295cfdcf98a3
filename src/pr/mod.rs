pub mod commenter;
pub mod messages;

pub use commenter::{CommentOutcome, PrCommenter};
pub use messages::MessageType;
