mod cluster;
mod file;
mod ipns;
mod keys;
mod mail;
mod pin;
mod removal;

pub use cluster::ClusterPinConsumer;
pub use file::FileConsumer;
pub use ipns::IpnsConsumer;
pub use keys::{KeyCreationConsumer, key_name};
pub use mail::MailConsumer;
pub use pin::PinConsumer;
pub use removal::PinRemovalConsumer;
