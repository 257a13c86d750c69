//! # choucalerte - Search-and-rescue planning core
//!
//! choucalerte turns testimonial clues about a missing person into candidate
//! zones on a map, and intersects the trusted ones into a probable location
//! zone (ZLP) inside an operator-defined search boundary.
//!
//! ## Core Concepts
//!
//! - **Search boundary (ISA)**: polygon every derived zone is clipped to
//! - **Clue**: a spatial relation (sees, near, sun/shadow, hears) between the
//!   victim and a reference feature, at a given time
//! - **ZLC**: zone derived from one clue by the remote geometry service
//! - **ZLP**: intersection of the zones of every trusted clue anchored to now
//! - **Store**: the observable state; every write runs a reaction before it
//!   is committed and pushes a permalink
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use choucalerte::{Clue, HttpGeometryService, RelationKind, RelationParams, SearchBoundary,
//!     ServiceConfig, Session, Target};
//!
//! let service = Arc::new(HttpGeometryService::new(&ServiceConfig::from_env())?);
//! let mut session = Session::new(service)?;
//! session.set_boundary(Some(SearchBoundary::from_bbox([5.7, 45.1, 5.9, 45.3])?)).await?;
//!
//! let clue = Clue::builder()
//!     .relation(RelationKind::ImmediateProximity)
//!     .target(Target::feature(lake))
//!     .params(RelationParams::proximity(200.0, 50.0))
//!     .build()?;
//! session.add_clue(clue).await?;
//! println!("{:?}", session.state().probable_zone);
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod boundary;
pub mod clue;
pub mod error;
pub mod geometry;
pub mod reference;
pub mod state;
pub mod time;
pub mod victim;

// State container and its reactions
pub mod diff;
pub mod permalink;
pub mod store;
pub mod validation;

// Remote services and derivations
pub mod aggregate;
pub mod derivation;
pub mod service;

// Orchestration
pub mod assist;
pub mod config;
pub mod document;
pub mod feed;
pub mod session;

// Re-export primary types at crate root for convenience
pub use boundary::{BoundaryId, SearchBoundary};
pub use clue::{Clue, ClueBuilder, ClueId, ClueZone, ColorPair, RelationKind, RelationParams, Target, ZoneType};
pub use error::{ChoucasError, ChoucasResult, ExecutionError, ServiceError, ValidationError};
pub use reference::{FragmentCensus, RefCategory, ReferenceCatalog};
pub use state::{AppState, BaseLayer, Field, FieldValue, ProbableZone, Viewport};
pub use time::{TimeDescriptor, TimeKind};
pub use victim::Victim;

pub use diff::{ClueDiff, ClueDiffEngine, EditDecision};
pub use permalink::{History, HistoryEntry, MemoryHistory, Permalink, Snapshot};
pub use store::{Effect, Projection, Reaction, RenderUpdate, Store, TransactionMode};

pub use aggregate::{AggregationOutcome, AggregationRequest, AggregationTicket, Aggregator};
pub use derivation::{DerivationOutcome, DerivationRequest, DerivationSettings, DerivationTicket};
pub use service::{BooleanMatrix, ClueAnnotation, GeocodeQuery, GeometryService, SunRequest};

#[cfg(feature = "http")]
pub use service::HttpGeometryService;

pub use assist::{ClueAssistant, Suggestion};
pub use config::{FeedConfig, ServiceConfig, SessionConfig, StoreConfig};
pub use document::{ClueNote, ExportDocument};
pub use feed::{BusyGuard, FeedStream, Level, OperatorEvent, OperatorFeed};
pub use session::{Completion, Session, SessionBuilder};
