pub mod http;
pub mod paper;

pub use http::{HttpAccountClient, HttpIndicatorFeed, HttpOrderGateway};
pub use paper::{PaperExchange, PaperOrder};
