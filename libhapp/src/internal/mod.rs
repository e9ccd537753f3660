//! Internal interface
//
// SPDX-License-Identifier: MIT
// Copyright (C) 2022-2025 VTT Technical Research Centre of Finland Ltd

pub(crate) mod dispatcher;
pub(crate) mod ed25519;
