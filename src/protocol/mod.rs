pub mod canonical;
pub mod openai_chat;
pub mod workflow;
