//! Shared test harness modules for the `osm-snapshot` CLI.

use super::*;

mod helpers;
