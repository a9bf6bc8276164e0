// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::rnd::Rnd;

/// Builds the order in which resources are tried.
///
/// Walks `0..len` starting at `start % len` and wrapping around, so every resource
/// appears exactly once. With `random` set, every position after the first is shuffled;
/// the starting resource always goes first.
pub(crate) fn attempt_order(len: usize, start: usize, random: bool, rnd: &Rnd) -> Vec<usize> {
    if len == 0 {
        return Vec::new();
    }

    let start = start % len;
    let mut order: Vec<usize> = (0..len).map(|offset| (start + offset) % len).collect();

    if random {
        // Fisher-Yates over the tail.
        let tail = &mut order[1..];
        for i in (1..tail.len()).rev() {
            let j = rnd.next_below(i + 1);
            tail.swap(i, j);
        }
    }

    order
}
