pub mod catalog;
pub mod controller;
pub mod error;
pub mod session;
pub mod state;
pub mod submit;
pub mod types;
pub mod validator;
pub mod wasm;

#[cfg(target_arch = "wasm32")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

pub use catalog::{Catalog, FieldDefinition, FieldKind};
pub use controller::{FormController, FormControllerOptions, SingleThreadedAsyncStdExecutor};
pub use error::{CatalogError, FormError, SubmitError};
pub use session::SessionId;
pub use state::{AnswerSet, AnswerValue, FormEvent, ResubmitPolicy};
pub use submit::{build_payload, HttpCollector};
pub use types::{Collector, Dispatcher, Executor, Feedback, FormView, SubmissionPayload};
