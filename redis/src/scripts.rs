//! Server-side scripts.
//!
//! Each multi-key mutation runs as one Lua script so Redis executes it
//! atomically. `redis::Script` sends `EVALSHA` and falls back to `EVAL` when
//! the script cache is cold.
//!
//! Every key a script touches arrives through `KEYS`. Scripts never build key
//! names from `ARGV` or stored values; callers read what they need first and
//! the script re-checks it.

use redis::Script;

/// `KEYS[1]` next, `KEYS[2]` waiting; `ARGV[1]` user id.
///
/// Returns the user's sequence number, reusing an existing one.
pub const ENTER_QUEUE: &str = r"
local score = redis.call('ZSCORE', KEYS[2], ARGV[1])
if score then
    return tonumber(score)
end
local seq = redis.call('INCR', KEYS[1])
redis.call('ZADD', KEYS[2], seq, ARGV[1])
return seq
";

/// `KEYS[1]` waiting, `KEYS[2]` current, `KEYS[3]` working, `KEYS[4]` lease marker;
/// `ARGV[1]` user id, `ARGV[2]` max concurrent, `ARGV[3]` lease TTL seconds,
/// `ARGV[4]` marker TTL seconds.
///
/// Returns 1 when the user holds a lease afterwards, 0 when every slot is taken.
pub const ENTER_TICKETING: &str = r"
if redis.call('EXISTS', KEYS[3]) == 1 then
    return 1
end
if redis.call('EXISTS', KEYS[4]) == 1 then
    redis.call('ZREM', KEYS[1], ARGV[1])
    redis.call('SET', KEYS[3], 1, 'EX', ARGV[3])
    redis.call('SET', KEYS[4], 1, 'EX', ARGV[4])
    return 1
end
local current = tonumber(redis.call('GET', KEYS[2]) or '0')
if current >= tonumber(ARGV[2]) then
    return 0
end
redis.call('ZREM', KEYS[1], ARGV[1])
redis.call('INCR', KEYS[2])
redis.call('SET', KEYS[3], 1, 'EX', ARGV[3])
redis.call('SET', KEYS[4], 1, 'EX', ARGV[4])
return 1
";

/// `KEYS[1]` current, `KEYS[2]` working, `KEYS[3]` lease marker.
///
/// Returns 1 if a lease was removed, 0 otherwise.
pub const LEAVE_TICKETING: &str = r"
if redis.call('DEL', KEYS[2]) == 1 then
    redis.call('DEL', KEYS[3])
    if tonumber(redis.call('GET', KEYS[1]) or '0') > 0 then
        redis.call('DECR', KEYS[1])
    end
    return 1
end
return 0
";

/// `KEYS[1]` current.
///
/// Returns 0 if the count is already zero, 1 after decrementing.
pub const LEAVE_SCREEN: &str = r"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
if current <= 0 then
    return 0
end
redis.call('DECR', KEYS[1])
return 1
";

/// `KEYS[1]` current, `KEYS[2]` working, `KEYS[3]` lease marker.
///
/// Returns -1 if the lease is live, 0 if already reaped, 1 if this call reaped it.
pub const REAP_WORKING_LEASE: &str = r"
if redis.call('EXISTS', KEYS[2]) == 1 then
    return -1
end
if redis.call('DEL', KEYS[3]) == 0 then
    return 0
end
if tonumber(redis.call('GET', KEYS[1]) or '0') > 0 then
    redis.call('DECR', KEYS[1])
end
return 1
";

/// `KEYS[1]` selection, `KEYS[2..n+1]` seat leases;
/// `ARGV[1]` TTL seconds, `ARGV[2..n+1]` lease JSON, `ARGV[n+2..2n+1]` seat ids.
///
/// Returns 0 when every seat was leased, -1 if the user already has a
/// selection, `k` if the k-th seat is taken. Nothing is written unless 0.
pub const PREOCCUPY_SEATS: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return -1
end
for i = 2, #KEYS do
    if redis.call('EXISTS', KEYS[i]) == 1 then
        return i - 1
    end
end
local n = #KEYS - 1
for i = 2, #KEYS do
    redis.call('SET', KEYS[i], ARGV[i], 'EX', ARGV[1])
    redis.call('SADD', KEYS[1], ARGV[n + i])
end
redis.call('EXPIRE', KEYS[1], ARGV[1])
return 0
";

/// `KEYS[1]` selection, `KEYS[2..]` seat leases; `ARGV[1]` user id, `ARGV[2..]` seat ids.
///
/// Returns one code per seat: 1 released, 0 not held, -1 held by another user.
pub const RELEASE_SEATS: &str = r"
local results = {}
for i = 2, #KEYS do
    local raw = redis.call('GET', KEYS[i])
    if not raw then
        redis.call('SREM', KEYS[1], ARGV[i])
        results[i - 1] = 0
    elseif tostring(cjson.decode(raw).userId) == ARGV[1] then
        redis.call('DEL', KEYS[i])
        redis.call('SREM', KEYS[1], ARGV[i])
        results[i - 1] = 1
    else
        results[i - 1] = -1
    end
end
if redis.call('SCARD', KEYS[1]) == 0 then
    redis.call('DEL', KEYS[1])
end
return results
";

/// `KEYS[1]` selection, `KEYS[2..n+1]` seat leases; `ARGV[1]` user id,
/// `ARGV[2..n+1]` seat ids as read from the selection.
///
/// Returns the released seat ids, or nil when the selection no longer matches
/// the seats passed in.
pub const RELEASE_ALL_SEATS: &str = r"
if redis.call('SCARD', KEYS[1]) ~= #ARGV - 1 then
    return false
end
for i = 2, #ARGV do
    if redis.call('SISMEMBER', KEYS[1], ARGV[i]) == 0 then
        return false
    end
end
local released = {}
for i = 2, #KEYS do
    local raw = redis.call('GET', KEYS[i])
    if raw and tostring(cjson.decode(raw).userId) == ARGV[1] then
        redis.call('DEL', KEYS[i])
        table.insert(released, ARGV[i])
    end
end
redis.call('DEL', KEYS[1])
return released
";

/// `KEYS[1]` seat lease, `KEYS[2]` holder's selection; `ARGV[1]` expected
/// holder, `ARGV[2]` seat id.
///
/// Returns `{outcome, lease JSON}` where outcome is 1 when consumed, 0 when
/// there is no lease and 2 when the lease changed hands since it was read.
pub const CONSUME_SEAT_LEASE: &str = r"
local raw = redis.call('GET', KEYS[1])
if not raw then
    return {0, false}
end
if tostring(cjson.decode(raw).userId) ~= ARGV[1] then
    return {2, false}
end
redis.call('DEL', KEYS[1])
redis.call('SREM', KEYS[2], ARGV[2])
if redis.call('SCARD', KEYS[2]) == 0 then
    redis.call('DEL', KEYS[2])
end
return {1, raw}
";

/// `KEYS[1]` lock; `ARGV[1]` token.
///
/// Returns 1 if the token held the lock and it was deleted.
pub const RELEASE_NAMED_LOCK: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
";

/// Compiled scripts, hashed once per store.
#[derive(Debug)]
pub(crate) struct Scripts {
    pub enter_queue: Script,
    pub enter_ticketing: Script,
    pub leave_ticketing: Script,
    pub leave_screen: Script,
    pub reap_working_lease: Script,
    pub preoccupy_seats: Script,
    pub release_seats: Script,
    pub release_all_seats: Script,
    pub consume_seat_lease: Script,
    pub release_named_lock: Script,
}

impl Scripts {
    pub(crate) fn load() -> Self {
        Self {
            enter_queue: Script::new(ENTER_QUEUE),
            enter_ticketing: Script::new(ENTER_TICKETING),
            leave_ticketing: Script::new(LEAVE_TICKETING),
            leave_screen: Script::new(LEAVE_SCREEN),
            reap_working_lease: Script::new(REAP_WORKING_LEASE),
            preoccupy_seats: Script::new(PREOCCUPY_SEATS),
            release_seats: Script::new(RELEASE_SEATS),
            release_all_seats: Script::new(RELEASE_ALL_SEATS),
            consume_seat_lease: Script::new(CONSUME_SEAT_LEASE),
            release_named_lock: Script::new(RELEASE_NAMED_LOCK),
        }
    }
}
