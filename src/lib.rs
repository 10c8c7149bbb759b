// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

#![doc = include_str!("../README.md")]

mod client;
mod codec;
mod error;
mod frame;
mod session;
mod util;
mod value;

pub use client::*;
pub use codec::tcp;
pub use error::*;
pub use frame::*;
pub use session::*;
pub use value::*;
