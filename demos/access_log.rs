use json_log_format::access::{combined_log_line, common_log_line};
use json_log_format::{AccessLog, JsonFormatter, RequestSummary};
use std::time::Duration;

fn main() {
    let access = match AccessLog::from_env() {
        Ok(access) => access,
        Err(e) => {
            eprintln!("invalid access log configuration: {}", e);
            return;
        }
    };
    let formatter = JsonFormatter::default();

    let request = RequestSummary {
        remote_ip: Some("127.0.0.1".into()),
        current_user: Some("frank".into()),
        start_time: 971_211_336.0,
        duration: Duration::from_micros(2_750),
        response_bytes: Some(2326),
        headers: vec![
            ("Referer".into(), "http://www.example.com/start.html".into()),
            ("User-Agent".into(), "Mozilla/4.08".into()),
        ],
        query_args: vec![("size".into(), vec!["large".into()])],
        ..RequestSummary::new("GET", "/apache_pb.gif?size=large", 200)
    };

    println!("{}", common_log_line(&request));
    println!("{}", combined_log_line(&request));
    println!("{}", formatter.format(&access.json_event(&request)));

    let failed = RequestSummary {
        correlation_id: Some("6d2c7a5e".into()),
        ..RequestSummary::new("POST", "/orders", 503)
    };
    println!("{}", formatter.format(&access.combined_event(&failed)));
}
