// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control protocol for the vigil daemon.
//!
//! Wire format: 4-byte length prefix (big-endian), then a 4-byte message
//! type tag, then positional fields packed per the message's pack string
//! (`i` signed 32-bit, `u` unsigned 32-bit, `s` length-prefixed string).

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod frame;
mod message;
mod pack;

pub use frame::{read_message, write_message, ProtocolError, MAX_FRAME_SIZE};
pub use message::Message;
pub use pack::{
    pop_int, pop_string, pop_unsigned, push_int, push_string, push_unsigned, WireError,
};
