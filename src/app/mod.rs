// Application layer - Use case interactors

pub mod container;
pub mod edit_interactor;
pub mod inspect_interactor;
pub mod verify_interactor;

// Re-export interactors
pub use container::{AppContainer, DefaultAppContainer};
pub use edit_interactor::EditInteractor;
pub use inspect_interactor::{InspectFormat, InspectInteractor, InspectRequest, InspectResponse};
pub use verify_interactor::{VerifyInteractor, VerifyRequest};
