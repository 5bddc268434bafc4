//! Facts about the page the tracker runs in.
use std::fmt::Debug;

/// Read access to the hosting page.
///
/// Values are read when an interaction starts and when a request is sent,
/// so implementations should return what is current at that moment.
pub trait Page: Send + Sync + Debug {
    /// Full URL of the page, e.g. `https://shop.example/items?sort=asc`.
    fn href(&self) -> String;

    /// User agent string of the host.
    fn user_agent(&self) -> String;
}

/// A page whose URL and user agent never change.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StaticPage {
    href: String,
    user_agent: String,
}

impl StaticPage {
    /// A page at `href` seen by `user_agent`.
    pub fn new<H: Into<String>, U: Into<String>>(href: H, user_agent: U) -> Self {
        StaticPage {
            href: href.into(),
            user_agent: user_agent.into(),
        }
    }
}

impl Page for StaticPage {
    fn href(&self) -> String {
        self.href.clone()
    }

    fn user_agent(&self) -> String {
        self.user_agent.clone()
    }
}
