//! CTE workbench core: split a query's WITH clause into editable fragments,
//! track how they depend on each other, run any fragment on its own and put
//! the query back together.

pub mod analyzer;
pub mod composer;
pub mod config;
pub mod error;
pub mod extractor;
pub mod formatter;
pub mod fragment;
pub mod graph;
pub mod isolator;
pub mod parser;
pub mod resolver;
pub mod session;
pub mod sql_text;
pub mod workspace;

pub use analyzer::{analyze_dependents, find_circular_dependencies};
pub use composer::{compose, count_ctes, CteComposer};
pub use config::{ComposerConfig, SqlDialect, WithClauseStyle};
pub use error::{CteError, ParseInput, Result};
pub use extractor::{decompose, extract_fragments, refresh_dependencies, Decomposition};
pub use fragment::{Fragment, FragmentMap, MainQuery};
pub use isolator::isolate_main_query;
pub use resolver::resolve_for_standalone_execution;
pub use workspace::{FragmentOverrides, Workspace};
