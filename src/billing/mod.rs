//! Billing records.
//!
//! Invoices are raised elsewhere; this crate only tracks their payment state
//! as GoCardless reports it.

mod invoice;

pub use invoice::{Invoice, InvoiceRepository, InvoiceStatus};
