// Nightscout HTTP access: reqwest client and the source trait.

pub mod client;
pub mod traits;

pub use client::NightscoutClient;
pub use traits::EntrySource;
