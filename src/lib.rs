pub mod app;
pub mod batch;
pub mod classify;
pub mod concat;
pub mod config;
pub mod dataset;
pub mod domain;
pub mod enplot;
pub mod error;
pub mod fs_util;
pub mod gallery;
pub mod gsea;
pub mod intersect;
pub mod joblog;
pub mod layout;
pub mod matrix;
pub mod output;
pub mod phenotype;
pub mod report;
pub mod strategy;
pub mod summary;
pub mod tui;
