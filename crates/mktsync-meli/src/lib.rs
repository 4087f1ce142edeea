//! Mercado Livre client and order normalization.
//!
//! [`MeliClient`] talks to the marketplace REST API (order search, order and
//! shipment detail, OAuth refresh). The [`normalize`] module turns one order
//! plus its shipment into a [`mktsync_core::NormalizedOrder`], resolving
//! freight and platform fee.

pub mod client;
mod de;
pub mod error;
pub mod normalize;
pub(crate) mod retry;
pub mod types;

pub use client::{MeliClient, PAGE_LIMIT};
pub use retry::backoff_delay_ms;
pub use error::MeliError;
pub use normalize::{aggregate_fee, normalize_order, resolve_freight};
pub use types::{
    MeliOrder, MeliOrderItem, MeliShipment, OrderPayload, OrderSearchQuery, OrdersPage, RawOrder,
    RawShipment, ShipmentSource, TokenRejection,
};
