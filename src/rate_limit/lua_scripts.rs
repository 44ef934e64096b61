/// Lua script for consuming one request from a fixed window stored in a Redis hash
///
/// The window is kept as a JSON string in a hash field so the stored shape stays
/// `{"total":..,"remaining":..,"reset":..}`. Running it as a script makes the
/// read-check-decrement-write cycle atomic.
///
/// KEYS[1] = the namespace (hash key)
/// ARGV[1] = the rate limit key (hash field)
/// ARGV[2] = requests per window
/// ARGV[3] = window duration (milliseconds), also the hash TTL
/// ARGV[4] = current timestamp (epoch milliseconds)
///
/// Returns: [total, remaining, reset]
pub const CONSUME_WINDOW_SCRIPT: &str = r#"
local namespace = KEYS[1]
local field = ARGV[1]
local count = tonumber(ARGV[2])
local expire = tonumber(ARGV[3])
local now = tonumber(ARGV[4])

local total = count
local remaining = count
local reset = now + expire

-- JSON integers only; numeric strings and fractions count as malformed
local function is_integer(value)
    return type(value) == 'number' and value == math.floor(value)
end

-- Load existing window, ignoring anything that does not decode
local raw = redis.call('HGET', namespace, field)
if raw then
    local ok, decoded = pcall(cjson.decode, raw)
    if ok and type(decoded) == 'table'
        and is_integer(decoded.total) and decoded.total >= 0
        and is_integer(decoded.remaining)
        and is_integer(decoded.reset) and decoded.reset >= 0 then
        total = decoded.total
        remaining = decoded.remaining
        reset = decoded.reset
    end
end

-- Replace an expired window; total is kept
if now > reset then
    reset = now + expire
    remaining = count
end

-- Never go below -1
remaining = math.max(remaining - 1, -1)

local encoded = string.format(
    '{"total":%d,"remaining":%d,"reset":%d}', total, remaining, reset)
redis.call('HSET', namespace, field, encoded)

-- Every live window ends within `expire` of its last write, so the hash may
-- lapse once the namespace has seen no writes for that long
redis.call('PEXPIRE', namespace, expire)

return {total, remaining, reset}
"#;
