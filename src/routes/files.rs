pub mod controllers;
pub mod dto;
