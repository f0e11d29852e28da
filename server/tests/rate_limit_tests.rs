use receipt_server::middleware::RateLimiter;
use std::net::{IpAddr, Ipv4Addr};
use std::thread;
use std::time::Duration;

#[test]
fn test_rate_limiter_creation() {
    let limiter = RateLimiter::new();
    let ip = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));

    assert!(limiter.check_rate_limit(ip));
}

#[test]
fn test_rate_limit_allows_under_limit() {
    let limiter = RateLimiter::new();
    let ip = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));

    // Default limit is 10 per window
    for _ in 0..10 {
        assert!(
            limiter.check_rate_limit(ip),
            "Should allow requests under limit"
        );
    }
}

#[test]
fn test_rate_limit_blocks_over_limit() {
    let limiter = RateLimiter::new();
    let ip = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));

    for _ in 0..10 {
        limiter.check_rate_limit(ip);
    }

    // 11th request should be blocked
    assert!(
        !limiter.check_rate_limit(ip),
        "Should block requests over limit"
    );
}

#[test]
fn test_custom_limits() {
    let limiter = RateLimiter::with_limits(2, Duration::from_secs(60));
    let ip = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));

    assert!(limiter.check_rate_limit(ip));
    assert!(limiter.check_rate_limit(ip));
    assert!(!limiter.check_rate_limit(ip));
}

#[test]
fn test_window_expiration() {
    let limiter = RateLimiter::with_limits(2, Duration::from_millis(50));
    let ip = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));

    assert!(limiter.check_rate_limit(ip));
    assert!(limiter.check_rate_limit(ip));
    assert!(!limiter.check_rate_limit(ip));

    // After the window passes the quota resets
    thread::sleep(Duration::from_millis(60));
    assert!(limiter.check_rate_limit(ip));
}

#[test]
fn test_rate_limit_per_ip() {
    let limiter = RateLimiter::new();
    let ip1 = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1));
    let ip2 = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 2));

    for _ in 0..10 {
        limiter.check_rate_limit(ip1);
    }

    assert!(!limiter.check_rate_limit(ip1));
    assert!(limiter.check_rate_limit(ip2));
}

#[test]
fn test_cleanup_old_entries() {
    let limiter = RateLimiter::new();
    let ip = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));

    for _ in 0..5 {
        limiter.check_rate_limit(ip);
    }

    // Cleanup won't remove anything since entries are recent
    limiter.cleanup_old_entries();

    assert!(limiter.check_rate_limit(ip));
}

#[test]
fn test_concurrent_rate_limiting() {
    use std::sync::Arc;

    let limiter = Arc::new(RateLimiter::new());
    let ip = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));
    let mut handles = vec![];

    for _ in 0..5 {
        let limiter_clone = Arc::clone(&limiter);
        let handle = thread::spawn(move || {
            for _ in 0..3 {
                limiter_clone.check_rate_limit(ip);
                thread::sleep(Duration::from_millis(1));
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }

    // After 15 requests (5 threads * 3 requests), the default limit is spent
    assert!(!limiter.check_rate_limit(ip));
}

#[test]
fn test_default_implementation() {
    let limiter = RateLimiter::default();
    let ip = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));

    assert!(limiter.check_rate_limit(ip));
}
