pub mod auth;
pub mod grpc;
pub mod rest;
