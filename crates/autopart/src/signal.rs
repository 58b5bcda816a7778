// Copyright 2021 System76 <info@system76.com>
// SPDX-License-Identifier: LGPL-3.0-only

/// Notifies observers that a value changed, without carrying the value.
///
/// Observers run synchronously in the order they were connected, and must not
/// modify the object which emitted the signal.
#[derive(Default)]
pub struct Signal {
    observers: Vec<Box<dyn Fn()>>,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect<F: Fn() + 'static>(&mut self, observer: F) {
        self.observers.push(Box::new(observer));
    }

    pub fn emit(&self) {
        for observer in &self.observers {
            observer();
        }
    }
}
