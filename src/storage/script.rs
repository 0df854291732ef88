//! The atomic decision script (C4), embedded as a constant so the store
//! adapter can `SCRIPT LOAD` it once and invoke it by SHA thereafter.
//!
//! Grounded in the check-then-write, up-to-`N_max`-rates composition of
//! spec §4.4. `original_source/src/pacer/storage_simple.py` loads its
//! script from a `lua/gcra.lua` file on disk and only ever evaluates one
//! rate per call; this script is authored fresh to compose up to three
//! rates in a single round trip, matching the wire contract of spec §6
//! (`KEYS[1..3]`, `ARGV = [now_ms, tau_policy, n_rates, T_1, B_1, ...]`,
//! reply `[allowed, retry_after_ms, reset_ms, remaining, matched_rate_index]`
//! with a 1-based index).

/// Maximum number of rates a single policy (and thus a single script
/// invocation) may carry. Mirrors [`crate::policy::DEFAULT_MAX_RATES`].
pub const N_MAX: usize = 3;

pub const GCRA_SCRIPT: &str = r#"
-- KEYS[1..n] = per-rate TAT keys, padded to N_MAX with empty strings
-- ARGV = { now_ms, tau_policy_ms, n_rates, T_1, B_1, T_2, B_2, T_3, B_3 }
-- reply = { allowed(0|1), retry_after_ms, reset_ms, remaining, matched_rate_index(1-based) }

local now_ms = tonumber(ARGV[1])
local tau_policy = tonumber(ARGV[2])
local n_rates = tonumber(ARGV[3])

local rate_allowed = {}
local new_tat = {}
local reset = {}
local remaining = {}
local retry = {}

for i = 1, n_rates do
    local t_i = tonumber(ARGV[3 + (i - 1) * 2 + 1])
    local b_i = tonumber(ARGV[3 + (i - 1) * 2 + 2])
    local key = KEYS[i]

    local stored = redis.call('GET', key)
    local tat
    if stored then
        tat = tonumber(stored)
    else
        tat = now_ms
    end

    local allow_at = tat - b_i
    if now_ms < allow_at then
        rate_allowed[i] = false
        retry[i] = allow_at - now_ms
        reset[i] = tat - now_ms
        remaining[i] = 0
    else
        local tat_candidate = tat
        if now_ms > tat_candidate then
            tat_candidate = now_ms
        end
        local computed_tat = tat_candidate + t_i
        rate_allowed[i] = true
        new_tat[i] = computed_tat
        reset[i] = computed_tat - now_ms
        local rem = math.floor((b_i - (computed_tat - now_ms)) / t_i)
        if rem < 0 then
            rem = 0
        end
        remaining[i] = rem
        retry[i] = 0
    end
end

local all_allowed = true
for i = 1, n_rates do
    if not rate_allowed[i] then
        all_allowed = false
    end
end

if not all_allowed then
    local matched = 1
    local best_retry = -1
    for i = 1, n_rates do
        if not rate_allowed[i] and retry[i] > best_retry then
            best_retry = retry[i]
            matched = i
        end
    end
    return { 0, retry[matched], reset[matched], 0, matched }
end

for i = 1, n_rates do
    redis.call('SET', KEYS[i], new_tat[i])
    redis.call('PEXPIRE', KEYS[i], tau_policy)
end

local matched = 1
local best_remaining = remaining[1]
for i = 2, n_rates do
    if remaining[i] < best_remaining then
        best_remaining = remaining[i]
        matched = i
    end
end

return { 1, 0, reset[matched], remaining[matched], matched }
"#;
