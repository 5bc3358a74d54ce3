pub mod candidates;
pub mod catalog;
pub mod migrations;
pub mod pool;
pub mod results;
pub mod sessions;
pub mod store;

// Keep re-exports unique so downstream crates see a single symbol per helper.
pub use candidates::{
    fetch_eligible_candidates, fetch_pending_candidate_items, upsert_candidate_dimension_vector,
    CandidateDimensionSink, CandidateFetchError,
};
pub use catalog::{
    fetch_choice, fetch_pending_choice_items, upsert_choice_vector, CatalogError, ChoiceVectorSink,
};
pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool_from_url, DbPoolError, PgPool};
pub use results::{
    fetch_match_rows, replace_results, replace_results_forced, ReplaceOutcome, ResultStorageError,
};
pub use sessions::{fetch_session, fetch_session_answers, save_aggregates, SessionStorageError};
pub use store::PgMatchStore;
