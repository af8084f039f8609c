pub mod fragment;
pub mod view;
pub mod translate;
pub mod backup;
