pub mod provider;
pub mod claude;
pub mod openai;
pub mod factory;
pub mod sse;
