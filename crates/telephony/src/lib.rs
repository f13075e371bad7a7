//! Telephony provider surface: inbound webhook event shapes, outbound call
//! placement, and the voice markup documents returned to the provider.
//!
//! Everything provider-shaped lives here so the rest of the system speaks
//! only domain types. The wire format follows the Twilio voice API; a
//! different provider means a different client implementation behind the
//! same [`client::TelephonyClient`] trait.

pub mod client;
pub mod documents;
pub mod events;

pub use client::{
    normalize_number, CallPlacement, HttpTelephonyClient, PlacedCall, PlacementError,
    StaticTelephonyClient, TelephonyClient,
};
pub use documents::ResponseDocument;
pub use events::{map_provider_status, SpeechCallback, StatusCallback};
