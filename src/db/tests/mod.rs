// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod db_utils;
mod mem_test;
mod parity_test;
mod subtests;
