pub mod http_transport;
pub mod mailslurp;
pub mod two_captcha;

pub use http_transport::HttpTransport;
pub use mailslurp::MailSlurpMailbox;
pub use two_captcha::TwoCaptchaSolver;
