pub mod controller;
pub mod crawler;
pub mod web;
