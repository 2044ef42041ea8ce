pub mod browser;

pub use browser::MdnsBrowser;

/// Something that reports robots advertising themselves on the network.
///
/// Both calls are idempotent.
pub trait DiscoverySource {
    fn start(&mut self);
    fn stop(&mut self);
}
