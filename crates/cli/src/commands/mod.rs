// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod checkpoint;
pub mod load;
pub mod report;
pub mod timeline;
pub mod verify;
