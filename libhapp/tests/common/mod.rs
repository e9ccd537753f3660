// SPDX-License-Identifier: MIT
// Copyright (C) 2022-2025 VTT Technical Research Centre of Finland Ltd

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use happ::builder::Builder;
use happ::device::Device;
use happ::runtime::{Runtime, Trap};
use happ::Params;

pub const RUNTIME_ENTRY: u64 = 0xffff_ffff_c000_0000;
pub const APP_ENTRY:     u64 = 0x1_0000;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn builder(params: Params) -> Builder {
    let mut builder = Builder::new(params);
    builder.add(&[0x13u8; 3 * 4096], RUNTIME_ENTRY, true).unwrap();
    builder.add(&[0x6fu8; 4096 + 10], APP_ENTRY, false).unwrap();
    builder
}

pub fn device() -> Arc<Device> {
    init_logger();
    Device::open().unwrap()
}

type Step = Box<dyn FnMut(&mut [u8]) -> Trap + Send>;

/// A runtime that plays back a list of steps
///
/// Exits with 0 when it runs out of steps.
pub struct Script {
    steps: VecDeque<Step>,
}

impl Script {
    pub fn new() -> Self {
        Self{steps: VecDeque::new()}
    }

    pub fn then<F>(mut self, step: F) -> Self
        where F: FnMut(&mut [u8]) -> Trap + Send + 'static {
        self.steps.push_back(Box::new(step));
        self
    }

    pub fn boxed(self) -> Box<dyn Runtime> {
        Box::new(self)
    }
}

impl Runtime for Script {
    fn step(&mut self, shared: &mut [u8]) -> Trap {
        match self.steps.pop_front() {
            Some(mut step) => step(shared),
            None           => Trap::Exit(0),
        }
    }
}
