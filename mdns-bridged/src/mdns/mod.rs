//! Discovery transport seam.
//!
//! The refresher only knows the `Discovery` trait; `browser::MdnsBrowser` is
//! the production implementation on top of mdns-sd.

pub mod browser;

use std::time::Duration;
use anyhow::Result;
use futures::future::BoxFuture;
use shared::types::ServiceEntry;

pub trait Discovery: Send + Sync {
    /// Run one browse for `service_type` (e.g. "_workstation._tcp") and
    /// return what resolved before `timeout` elapsed.
    fn browse<'a>(
        &'a self,
        service_type: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Vec<ServiceEntry>>>;
}
