pub mod password_reset_token;
pub mod profile;
pub mod refresh_token;
pub mod role;
pub mod user;

pub use password_reset_token::PasswordResetToken;
pub use profile::{
    ApiResponse, CreateStudentRequest, ParentProfile, Profile, StudentProfile, TeacherProfile,
};
pub use refresh_token::RefreshToken;
pub use role::Role;
pub use user::{NewUser, User, UserInfo, UserStatus, UserType};
