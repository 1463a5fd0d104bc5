mod object_store;
mod state;
mod store;

pub use object_store::{ObjectStore, StoredObject, object_url};
pub use state::{AnalysisTicket, Session, SessionError, SessionView, error_body};
pub use store::SessionStore;
