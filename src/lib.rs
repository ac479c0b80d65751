//! # TCAP codec
//!
//! BER/DER codec for ITU-T Q.773 Transaction Capabilities Application Part
//! messages as carried on SS7/SIGTRAN networks:
//!
//! - **DER canonicaliser** - rewrites the BER relaxations peers actually
//!   emit (indefinite lengths, constructed string fragments, sloppy
//!   booleans) into the DER the structural codec assumes
//! - **TLV engine** - identifier/length codec over the tag set TCAP uses
//! - **Structural codec** - the five transaction types, the dialogue
//!   portion (AARQ/AARE/ABRT) and the component portion
//!
//! The crate is transport-agnostic: it maps between byte slices and the
//! message model and nothing else. SCCP framing, routing and transaction
//! state stay with the caller. Operation parameters are carried as opaque
//! TLV bytes; MAP/CAP semantics are out of scope.
//!
//! ## Example
//! ```rust
//! use tcap::{acn, new_begin, with_begin_dialogue_request, with_begin_invoke, Tcap};
//!
//! let parameter = vec![0x04, 0x01, 0xFF];
//! let msg = new_begin(
//!     [0x00, 0x47, 0x34, 0xA8],
//!     [
//!         with_begin_dialogue_request(acn::SHORT_MSG_GATEWAY, acn::VERSION3),
//!         with_begin_invoke(0, 45, Some(parameter)),
//!     ],
//! )?;
//!
//! let wire = msg.marshal()?;
//! assert_eq!(Tcap::parse_der(&wire)?, msg);
//! # Ok::<(), tcap::TcapError>(())
//! ```
//!
//! For network-sourced bytes prefer [`Tcap::parse_any`], which retries
//! through [`make_der`] when a peer sent indefinite-length BER.

pub mod asn1;
pub mod builder;
pub mod component;
pub mod dialogue;
pub mod errors;
pub mod message;

pub use asn1::der::make_der;
pub use builder::{
    new_abort, new_begin, new_continue, new_end, new_unidirectional, with_abort_p_abort_cause,
    with_abort_u_abort_cause, with_begin_dialogue_object, with_begin_dialogue_request,
    with_begin_invoke, with_continue_dialogue_object, with_continue_dialogue_request,
    with_continue_dialogue_response, with_continue_invoke, with_continue_return_result_last,
    with_end_dialogue_object, with_end_dialogue_request, with_end_dialogue_response,
    with_end_return_error, with_end_return_result_last, with_unidirectional_dialogue,
    with_unidirectional_invoke, AbortOption, BeginOption, ContinueOption, EndOption,
    UnidirectionalOption,
};
pub use component::{
    problem, Component, ComponentIter, ComponentPortion, Invoke, Reject, RejectProblem,
    ReturnError, ReturnResult,
};
pub use dialogue::{
    abort_source, acn, acn_name, associate_result, diagnostic_provider, diagnostic_user, Aare,
    Aarq, Abrt, Dialogue, DialoguePdu, SourceDiagnostic,
};
pub use errors::{Asn1Error, Result, TcapError};
pub use message::{p_abort, MessageType, Tcap, TransactionId};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Structured dialogue abstract-syntax id:
/// {itu-t(0) recommendation(0) q(17) 773 as(1) dialogue-as(1) version1(1)}.
pub const DIALOGUE_AS_ID: [u32; 7] = [0, 0, 17, 773, 1, 1, 1];

/// Unstructured dialogue abstract-syntax id:
/// {itu-t(0) recommendation(0) q(17) 773 as(1) unidialogue-as(2) version1(1)}.
pub const UNIDIALOGUE_AS_ID: [u32; 7] = [0, 0, 17, 773, 1, 2, 1];

/// Application-context-name prefix shared by the MAP contexts; the last two
/// arcs carry `{context, version}`.
pub const ACN_PREFIX: [u32; 6] = [0, 4, 0, 0, 1, 0];

/// Default padded protocol-version octet.
pub const PROTOCOL_VERSION: u8 = 0x80;

/// Invoke id range per Q.773.
pub const MIN_INVOKE_ID: i32 = -128;
pub const MAX_INVOKE_ID: i32 = 127;

/// Transaction id length bounds, in bytes.
pub const MIN_TRANSACTION_ID_LEN: usize = 1;
pub const MAX_TRANSACTION_ID_LEN: usize = 4;
