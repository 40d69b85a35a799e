//! # Linkscope - Physical topology discovery for lab and testbed networks
//!
//! This library discovers which host interfaces are wired to which by
//! querying every host of an inventory over SSH and fusing what each host
//! reports into a single network graph.
//!
//! ## Overview
//!
//! Every host is asked for its interfaces, their link state, and its
//! neighbors as seen through up to three discovery methods (LLDP, the ARP /
//! neighbor table, and active probing). The per-host evidence is often
//! one-sided, partial or contradictory; fusion reconciles it into undirected
//! links with an explicit confidence and reports every conflict instead of
//! silently picking a winner.
//!
//! ## Architecture
//!
//! Data flows strictly upward:
//!
//! - `transport`: the [`transport::CommandExecutor`] seam and the ssh-backed executor
//! - `collector`: interface, link-state and neighbor probes for one host
//! - `session`: one host's collection under a time budget
//! - `orchestrator`: bounded-concurrency fan-out over the whole inventory
//! - `topology`: fusion of all fact sets into a [`topology::Topology`], plus validation
//! - `inventory`: YAML inventory loading
//! - `report`: text, JSON and GraphViz output
//! - `utils`: MAC normalisation, exclusion patterns, durations
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use linkscope::{inventory, orchestrator, topology};
//!
//! # async fn run() -> color_eyre::Result<()> {
//! let inventory = inventory::load_inventory(Path::new("inventory/hosts.yaml"))?;
//! let targets = inventory
//!     .targets(&[])?
//!     .into_iter()
//!     .map(|h| h.collection_target())
//!     .collect();
//!
//! let run = orchestrator::collect_all(targets, &inventory.orchestrator_config()).await?;
//! let topology = topology::fuse(&run.hosts);
//!
//! for link in &topology.links {
//!     println!("{} <-> {} ({})", link.a, link.b, link.confidence);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Individual hosts never fail a run: unreachable or slow hosts come back as
//! `failed` fact sets. Only an empty or structurally invalid host list
//! produces an [`orchestrator::RunError`]. The binary reports errors through
//! `color_eyre`.

pub mod collector;
pub mod inventory;
pub mod orchestrator;
pub mod report;
pub mod session;
pub mod topology;
pub mod transport;
pub mod utils;
