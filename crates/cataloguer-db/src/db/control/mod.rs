pub mod invitation;
pub mod organization;
pub mod user;

pub use invitation::InvitationRepository;
pub use organization::OrganizationRepository;
pub use user::UserRepository;
