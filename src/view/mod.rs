mod view;

pub use view::{
    FeedView, MessageLog, PageView, RenderedEntry, StatusIndicator, StatusStyle,
    CONNECTING_MESSAGE, FAILURE_MESSAGE,
};
