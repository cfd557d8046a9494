pub mod auth;

pub use auth::{
    ForgotPasswordRequest, LoginRequest, LogoutRequest, MessageResponse, RefreshRequest,
    RegisterStudentRequest, ResetPasswordRequest, SessionResponse,
};
