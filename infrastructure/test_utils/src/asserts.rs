//  Copyright 2024, The Tari Project
//
//  Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
//  following conditions are met:
//
//  1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
//  disclaimer.
//
//  2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
//  following disclaimer in the documentation and/or other materials provided with the distribution.
//
//  3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
//  products derived from this software without specific prior written permission.
//
//  THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
//  INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
//  DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
//  SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
//  SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
//  WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
//  USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

/// Repeatedly evaluates `$check_expr` until it equals `$expect`, sleeping `$interval` between attempts. Panics once
/// `$max_attempts` is exceeded.
///
/// ```edition2021
/// # use meridian_test_utils::async_assert_eventually;
/// # use std::{sync::atomic::{AtomicUsize, Ordering}, time::Duration};
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let calls = AtomicUsize::new(0);
/// async_assert_eventually!(
///     calls.fetch_add(1, Ordering::SeqCst) >= 2,
///     expect = true,
///     max_attempts = 5,
///     interval = Duration::from_millis(1)
/// );
/// # }
/// ```
#[macro_export]
macro_rules! async_assert_eventually {
    ($check_expr:expr, expect = $expect:expr, max_attempts = $max_attempts:expr, interval = $interval:expr $(,)?) => {{
        let mut value = $check_expr;
        let mut attempts = 0usize;
        while value != $expect {
            attempts += 1;
            if attempts > $max_attempts {
                panic!(
                    "async_assert_eventually: expression '{}' did not equal '{:?}' after {} attempts (last value: \
                     {:?})",
                    stringify!($check_expr),
                    $expect,
                    $max_attempts,
                    value
                );
            }
            tokio::time::sleep($interval).await;
            value = $check_expr;
        }
    }};
    ($check_expr:expr, expect = $expect:expr $(,)?) => {{
        $crate::async_assert_eventually!(
            $check_expr,
            expect = $expect,
            max_attempts = 20,
            interval = std::time::Duration::from_millis(100)
        );
    }};
}
