use super::test_helpers::*;
use super::*;
use crate::error::{Error, TaskError};
use crate::types::{RecordStatus, TaskStatus};
use std::time::Duration;

mod control;
mod lifecycle;
