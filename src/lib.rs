//! # sunat-cpe
//!
//! Emission pipeline for Peruvian electronic payment vouchers (CPE):
//! facturas, boletas, and credit and debit notes sent to SUNAT.
//!
//! One call to [`emission::EmissionService::emit`] allocates a gap-free
//! correlative, computes the IGV breakdown, renders UBL 2.1, has it signed
//! by an external XAdES service, zips and stores the artifacts, submits
//! them through SOAP `sendBill` and records the verdict read from the CDR.
//!
//! All monetary values use [`rust_decimal::Decimal`]; amounts are rounded
//! half-up to 2 decimals per line and document totals are sums of the
//! rounded lines.
//!
//! ## Quick Start
//!
//! ```rust
//! use sunat_cpe::core::*;
//! use rust_decimal_macros::dec;
//!
//! let lines = vec![LineBuilder::new("Cuaderno A4", dec!(1), dec!(118)).build()];
//! let breakdown = compute_breakdown(&lines, DEFAULT_IGV_RATE).unwrap();
//! assert_eq!(breakdown.subtotal, dec!(100.00));
//! assert_eq!(breakdown.tax_amount, dec!(18.00));
//!
//! let number = DocumentNumber::new("F001", 42);
//! assert_eq!(
//!     number.filename("20123456789", DocumentType::Invoice),
//!     "20123456789-01-F001-00000042"
//! );
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `sqlite` (default) | sqlx-backed sequence and document repositories |
//! | `cli` | the `cpe` command-line binary |

pub mod allocator;
pub mod config;
pub mod core;
pub mod emission;
pub mod repository;
pub mod signing;
pub mod storage;
pub mod transmission;
pub mod ubl;

pub use crate::allocator::SequenceAllocator;
pub use crate::emission::{EmissionError, EmissionRequest, EmissionService, EmissionSettings};
