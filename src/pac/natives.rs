// src/pac/natives.rs
//! Native host functions exposed to PAC scripts.
//!
//! Every host operation a script can reach is registered here. Functions whose
//! capability is not granted, and well-known escape hatches from other script
//! hosts, are bound to refusal stubs instead.

use super::policy::{Capability, SandboxPolicy};
use boa_engine::{
    object::ObjectInitializer, property::Attribute, Context, JsArgs, JsNativeError, JsResult,
    JsString, JsValue, NativeFunction,
};
use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use regex::Regex;
use std::cell::RefCell;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs, UdpSocket};
use tracing::{info, warn};

type HostFn = fn(&JsValue, &[JsValue], &mut Context) -> JsResult<JsValue>;

struct HostFunction {
    name: &'static str,
    length: usize,
    requires: Option<Capability>,
    body: HostFn,
}

const HOST_FUNCTIONS: &[HostFunction] = &[
    HostFunction {
        name: "dnsResolve",
        length: 1,
        requires: Some(Capability::ResolveHost),
        body: dns_resolve,
    },
    HostFunction {
        name: "myIpAddress",
        length: 0,
        requires: Some(Capability::LocalAddress),
        body: my_ip_address,
    },
    HostFunction {
        name: "shExpMatch",
        length: 2,
        requires: None,
        body: sh_exp_match,
    },
    HostFunction {
        name: "weekdayRange",
        length: 3,
        requires: Some(Capability::Clock),
        body: weekday_range_fn,
    },
    HostFunction {
        name: "dateRange",
        length: 7,
        requires: Some(Capability::Clock),
        body: date_range_fn,
    },
    HostFunction {
        name: "timeRange",
        length: 7,
        requires: Some(Capability::Clock),
        body: time_range_fn,
    },
    HostFunction {
        name: "alert",
        length: 1,
        requires: None,
        body: alert,
    },
];

/// Loaders, file and process access offered by other script hosts.
const FORBIDDEN_GLOBALS: &[&str] = &[
    "require",
    "load",
    "loadClass",
    "readFile",
    "readUrl",
    "runCommand",
    "importClass",
    "importPackage",
    "fetch",
    "XMLHttpRequest",
    "quit",
    "exit",
    "spawn",
];

const FORBIDDEN_OBJECTS: &[(&str, &[&str])] = &[
    ("process", &["exit", "kill", "abort", "chdir", "binding", "dlopen"]),
    (
        "fs",
        &[
            "readFile",
            "readFileSync",
            "writeFile",
            "writeFileSync",
            "readdir",
            "readdirSync",
            "unlink",
            "unlinkSync",
            "open",
            "openSync",
        ],
    ),
    (
        "child_process",
        &["exec", "execSync", "execFile", "spawn", "spawnSync", "fork"],
    ),
];

thread_local! {
    static VIOLATION: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Clears the violation record of the current thread.
pub(crate) fn reset_violation() {
    VIOLATION.with(|slot| slot.borrow_mut().take());
}

/// Takes the first refused operation since the last reset, if any.
pub(crate) fn take_violation() -> Option<String> {
    VIOLATION.with(|slot| slot.borrow_mut().take())
}

fn record_violation(operation: &str) {
    VIOLATION.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_none() {
            *slot = Some(operation.to_string());
        }
    });
}

#[derive(Debug, Clone, Copy)]
struct Operation {
    object: Option<&'static str>,
    name: &'static str,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.object {
            Some(object) => write!(f, "{}.{}", object, self.name),
            None => f.write_str(self.name),
        }
    }
}

fn refusal(operation: Operation) -> NativeFunction {
    NativeFunction::from_copy_closure(move |_this, _args, _ctx| {
        let description = operation.to_string();
        warn!("PAC script attempted forbidden operation '{}'", description);
        record_violation(&description);
        Err(JsNativeError::error()
            .with_message(format!("'{description}' is not permitted in PAC scripts"))
            .into())
    })
}

/// Installs host functions into `context` according to `policy`.
pub(crate) fn register(context: &mut Context, policy: &SandboxPolicy) -> JsResult<()> {
    for function in HOST_FUNCTIONS {
        let granted = function.requires.map_or(true, |c| policy.permits(c));
        let body = if granted {
            NativeFunction::from_fn_ptr(function.body)
        } else {
            refusal(Operation {
                object: None,
                name: function.name,
            })
        };
        context.register_global_callable(JsString::from(function.name), function.length, body)?;
    }

    for &name in FORBIDDEN_GLOBALS {
        let body = refusal(Operation { object: None, name });
        context.register_global_callable(JsString::from(name), 0, body)?;
    }

    for &(object, methods) in FORBIDDEN_OBJECTS {
        let value = {
            let mut initializer = ObjectInitializer::new(context);
            for &name in methods {
                let body = refusal(Operation {
                    object: Some(object),
                    name,
                });
                initializer.function(body, JsString::from(name), 0);
            }
            initializer.build()
        };
        context.register_global_property(JsString::from(object), value, Attribute::all())?;
    }

    Ok(())
}

fn string_arg(args: &[JsValue], index: usize, context: &mut Context) -> JsResult<String> {
    Ok(args
        .get_or_undefined(index)
        .to_string(context)?
        .to_std_string_escaped())
}

// dnsResolve(host)
fn dns_resolve(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let host = string_arg(args, 0, context)?;
    match resolve_host(&host) {
        Some(ip) => Ok(JsString::from(ip.to_string().as_str()).into()),
        None => Ok(JsValue::null()),
    }
}

/// Resolves `host`, preferring an IPv4 address.
pub(crate) fn resolve_host(host: &str) -> Option<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Some(ip);
    }
    let addrs: Vec<IpAddr> = (host, 0)
        .to_socket_addrs()
        .ok()?
        .map(|addr| addr.ip())
        .collect();
    addrs
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
}

// myIpAddress()
fn my_ip_address(_this: &JsValue, _args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
    Ok(JsString::from(local_address().to_string().as_str()).into())
}

/// Address of the interface that routes outwards; no packet is sent.
fn local_address() -> IpAddr {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:53")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

// shExpMatch(str, glob)
fn sh_exp_match(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let text = string_arg(args, 0, context)?;
    let pattern = string_arg(args, 1, context)?;
    Ok(glob_matches(&text, &pattern).into())
}

/// Shell expression match: `*` is any run, `?` any single character.
pub(crate) fn glob_matches(text: &str, pattern: &str) -> bool {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push_str("(?s)^");
    let mut buf = [0u8; 4];
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }
    expr.push('$');
    Regex::new(&expr).is_ok_and(|re| re.is_match(text))
}

// alert(message)
fn alert(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let message = string_arg(args, 0, context)?;
    info!("PAC alert: {}", message);
    Ok(JsValue::undefined())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RangeArg {
    Number(i64),
    Text(String),
}

/// Converts the arguments of a range function, splitting off a trailing "GMT".
fn range_args(args: &[JsValue], context: &mut Context) -> JsResult<(bool, Vec<RangeArg>)> {
    let mut parsed = Vec::with_capacity(args.len());
    for value in args {
        if let Some(number) = value.as_number() {
            parsed.push(RangeArg::Number(number as i64));
            continue;
        }
        let text = value.to_string(context)?.to_std_string_escaped();
        match text.trim().parse::<i64>() {
            Ok(number) => parsed.push(RangeArg::Number(number)),
            Err(_) => parsed.push(RangeArg::Text(text)),
        }
    }
    let gmt = matches!(parsed.last(), Some(RangeArg::Text(t)) if t.eq_ignore_ascii_case("GMT"));
    if gmt {
        parsed.pop();
    }
    Ok((gmt, parsed))
}

fn now(gmt: bool) -> NaiveDateTime {
    if gmt {
        Utc::now().naive_utc()
    } else {
        Local::now().naive_local()
    }
}

fn weekday_range_fn(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let (gmt, args) = range_args(args, context)?;
    Ok(weekday_range(now(gmt), &args).into())
}

fn date_range_fn(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let (gmt, args) = range_args(args, context)?;
    Ok(date_range(now(gmt).date(), &args).into())
}

fn time_range_fn(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let (gmt, args) = range_args(args, context)?;
    Ok(time_range(now(gmt).time(), &args).into())
}

const WEEKDAYS: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];
const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

/// Inclusive range check that wraps when `start > end`.
fn within<T: PartialOrd>(value: T, start: T, end: T) -> bool {
    if start <= end {
        start <= value && value <= end
    } else {
        value >= start || value <= end
    }
}

fn position_of(names: &[&str], text: &str) -> Option<u32> {
    names
        .iter()
        .position(|name| name.eq_ignore_ascii_case(text.trim()))
        .map(|index| index as u32)
}

pub(crate) fn weekday_range(now: NaiveDateTime, args: &[RangeArg]) -> bool {
    let days: Option<Vec<u32>> = args
        .iter()
        .map(|arg| match arg {
            RangeArg::Text(text) => position_of(&WEEKDAYS, text),
            RangeArg::Number(_) => None,
        })
        .collect();
    let today = now.weekday().num_days_from_sunday();

    match days.as_deref() {
        Some([day]) => today == *day,
        Some([start, end]) => within(today, *start, *end),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DatePart {
    Day(u32),
    Month(u32),
    Year(i32),
}

impl DatePart {
    fn parse(arg: &RangeArg) -> Option<Self> {
        match arg {
            RangeArg::Number(n @ 1..=31) => Some(DatePart::Day(*n as u32)),
            RangeArg::Number(n) if *n >= 1000 => i32::try_from(*n).ok().map(DatePart::Year),
            RangeArg::Number(_) => None,
            RangeArg::Text(text) => position_of(&MONTHS, text).map(|m| DatePart::Month(m + 1)),
        }
    }

    fn same_kind(&self, other: &DatePart) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// The same component taken from `date`.
    fn of(&self, date: NaiveDate) -> Self {
        match self {
            DatePart::Day(_) => DatePart::Day(date.day()),
            DatePart::Month(_) => DatePart::Month(date.month()),
            DatePart::Year(_) => DatePart::Year(date.year()),
        }
    }
}

fn date_key(parts: &[DatePart]) -> (i32, u32, u32) {
    let mut key = (0, 0, 0);
    for part in parts {
        match *part {
            DatePart::Year(year) => key.0 = year,
            DatePart::Month(month) => key.1 = month,
            DatePart::Day(day) => key.2 = day,
        }
    }
    key
}

pub(crate) fn date_range(today: NaiveDate, args: &[RangeArg]) -> bool {
    let Some(parts) = args.iter().map(DatePart::parse).collect::<Option<Vec<_>>>() else {
        return false;
    };

    match parts.len() {
        1 => parts[0].of(today) == parts[0],
        2 | 4 | 6 => {
            let (start, end) = parts.split_at(parts.len() / 2);
            if !start.iter().zip(end).all(|(a, b)| a.same_kind(b)) {
                return false;
            }
            let current: Vec<DatePart> = start.iter().map(|part| part.of(today)).collect();
            within(date_key(&current), date_key(start), date_key(end))
        }
        _ => false,
    }
}

pub(crate) fn time_range(now: NaiveTime, args: &[RangeArg]) -> bool {
    let Some(values) = args
        .iter()
        .map(|arg| match arg {
            RangeArg::Number(n) => Some(*n),
            RangeArg::Text(_) => None,
        })
        .collect::<Option<Vec<i64>>>()
    else {
        return false;
    };
    let seconds = i64::from(now.num_seconds_from_midnight());

    let bounds = match *values.as_slice() {
        [h] => clock_seconds(h, 0, 0).map(|start| (start, start + 3599)),
        [h1, h2] => clock_seconds(h1, 0, 0).zip(clock_seconds(h2, 0, 0)),
        [h1, m1, h2, m2] => clock_seconds(h1, m1, 0).zip(clock_seconds(h2, m2, 0)),
        [h1, m1, s1, h2, m2, s2] => clock_seconds(h1, m1, s1).zip(clock_seconds(h2, m2, s2)),
        _ => None,
    };
    match bounds {
        Some((start, end)) => within(seconds, start, end),
        None => false,
    }
}

/// Seconds since midnight, or `None` for an impossible time of day.
fn clock_seconds(hour: i64, minute: i64, second: i64) -> Option<i64> {
    let valid = (0..=23).contains(&hour) && (0..=59).contains(&minute) && (0..=59).contains(&second);
    valid.then(|| hour * 3600 + minute * 60 + second)
}
