//! Request / response types shared by the routes and the OpenAPI document.

pub mod chat;
