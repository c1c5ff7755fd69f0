pub mod api;
pub mod config;
pub mod database;
pub mod errors;
pub mod llm_providers;
pub mod logging;
pub mod models;
pub mod roadmap_generator;
pub mod roadmap_graph;
pub mod roadmap_service;
pub mod timeline;

pub use config::Config;
pub use database::Database;
pub use errors::*;
pub use llm_providers::{CompletionProvider, JsonResponseParser, LLMProvider, LLMProviderFactory, LLMProviderType};
pub use models::*;
pub use roadmap_generator::{RetryPolicy, RoadmapGenerator};
pub use roadmap_graph::{build_roadmap_graph, layout_graph, LayoutDirection};
pub use roadmap_service::{validate_structure, RoadmapService};
pub use timeline::{estimate_timeline_duration, generate_timeline, generate_timeline_with, TimelineOptions};
