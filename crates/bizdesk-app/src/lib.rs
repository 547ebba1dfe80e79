// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod copy;
pub mod fields;
pub mod forms;
pub mod ids;
pub mod loader;
pub mod model;
pub mod selector;
pub mod service;
pub mod state;

pub use copy::*;
pub use fields::*;
pub use forms::*;
pub use ids::*;
pub use loader::*;
pub use model::*;
pub use selector::*;
pub use service::*;
pub use state::*;
