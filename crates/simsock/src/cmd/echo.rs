use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use simsock_frame::{MessageQueue, QueueEvent, DEFAULT_MAX_PAYLOAD};
use simsock_peer::QueueBroker;
use simsock_transport::{Broker, Channel, ChannelConfig, Executor, Registry, TransportError};
use tracing::{debug, info, warn};

use crate::cmd::{EchoArgs, EchoMode};
use crate::exit::{
    peer_error, transport_error, CliError, CliResult, DATA_INVALID, FAILURE, SUCCESS, TIMEOUT,
    USAGE,
};
use crate::output::{print_echo_report, ClientReport, EchoReport, OutputFormat};

const SERVER_NAME: &str = "echo-server";
const ECHO_CHUNK: usize = 512;

pub fn run(args: EchoArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    validate(&args)?;

    let executor = Executor::spawn("simsock-executor")
        .map_err(|err| transport_error("executor start failed", err))?;
    let result = run_scenario(&args, &executor, timeout);
    executor.shutdown();
    let report = result?;

    print_echo_report(&report, format);

    if report.timed_out {
        Ok(TIMEOUT)
    } else if report.all_matched() {
        Ok(SUCCESS)
    } else {
        Ok(FAILURE)
    }
}

fn validate(args: &EchoArgs) -> CliResult<()> {
    if args.clients == 0 {
        return Err(CliError::new(USAGE, "--clients must be at least 1"));
    }
    if args.buffer_capacity < 2 {
        return Err(CliError::new(USAGE, "--buffer-capacity must be at least 2"));
    }
    if args.message_size > DEFAULT_MAX_PAYLOAD {
        return Err(CliError::new(
            DATA_INVALID,
            format!("--message-size exceeds maximum payload of {DEFAULT_MAX_PAYLOAD} bytes"),
        ));
    }
    Ok(())
}

fn run_scenario(args: &EchoArgs, executor: &Executor, timeout: Duration) -> CliResult<EchoReport> {
    let registry = Registry::new();
    let config = ChannelConfig {
        buffer_capacity: args.buffer_capacity,
    };
    let server = Broker::with_config(SERVER_NAME, &registry, executor.clone(), config)
        .map_err(|err| transport_error("server start failed", err))?;

    info!(
        mode = args.mode.as_str(),
        port = args.port,
        clients = args.clients,
        messages = args.messages,
        "echo scenario started"
    );
    let started = Instant::now();
    let (reporter, reports) = mpsc::channel();

    match args.mode {
        EchoMode::Channel => {
            serve_channels(server, args.port)
                .map_err(|err| transport_error("accept failed", err))?;
            for index in 0..args.clients {
                let client = Broker::new(client_name(index), &registry, executor.clone())
                    .map_err(|err| transport_error("client start failed", err))?;
                let run = ClientRun::new(client.name(), args, reporter.clone());
                client
                    .connect(SERVER_NAME, args.port, move |channel| {
                        exchange_bytes(channel, run)
                    })
                    .map_err(|err| transport_error("connect failed", err))?;
            }
        }
        EchoMode::Queue => {
            let server = QueueBroker::from_broker(server);
            server
                .bind(args.port, echo_messages)
                .map_err(|err| peer_error("bind failed", err))?;
            for index in 0..args.clients {
                let client = QueueBroker::new(client_name(index), &registry, executor.clone())
                    .map_err(|err| peer_error("client start failed", err))?;
                let run = ClientRun::new(client.name(), args, reporter.clone());
                client
                    .connect(SERVER_NAME, args.port, move |result| match result {
                        Ok(queue) => exchange_messages(queue, run),
                        Err(err) => warn!(client = %run.name, error = %err, "connect failed"),
                    })
                    .map_err(|err| peer_error("connect failed", err))?;
            }
        }
    }
    drop(reporter);

    Ok(collect(args, reports, started, timeout))
}

fn collect(
    args: &EchoArgs,
    reports: Receiver<ClientReport>,
    started: Instant,
    timeout: Duration,
) -> EchoReport {
    let deadline = started + timeout;
    let mut clients = Vec::with_capacity(args.clients);
    let mut timed_out = false;

    while clients.len() < args.clients {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match reports.recv_timeout(remaining) {
            Ok(report) => clients.push(report),
            Err(RecvTimeoutError::Timeout) => {
                warn!(finished = clients.len(), expected = args.clients, "echo scenario timed out");
                timed_out = true;
                break;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    clients.sort_by(|a, b| (a.client.len(), &a.client).cmp(&(b.client.len(), &b.client)));

    let report = EchoReport {
        mode: args.mode.as_str(),
        port: args.port,
        buffer_capacity: args.buffer_capacity,
        client_count: args.clients,
        messages_per_client: args.messages,
        total_sent: clients.iter().map(|c| c.sent).sum(),
        total_matched: clients.iter().map(|c| c.matched).sum(),
        elapsed_ms: elapsed_ms(started),
        timed_out,
        clients,
    };
    info!(
        sent = report.total_sent,
        matched = report.total_matched,
        elapsed_ms = report.elapsed_ms,
        "echo scenario finished"
    );
    report
}

/// Re-arm the one-shot accept after every connection.
fn serve_channels(server: Broker, port: u16) -> Result<(), TransportError> {
    let next = server.clone();
    server.accept(port, move |channel| {
        if let Err(err) = serve_channels(next, port) {
            warn!(port, error = %err, "echo server stopped accepting");
        }
        debug!(remote = channel.remote_name(), "echo connection accepted");
        echo_bytes(channel);
    })
}

fn echo_bytes(channel: Channel) {
    let reader = channel.clone();
    let submitted = reader.read(BytesMut::zeroed(ECHO_CHUNK), 0, ECHO_CHUNK, move |completion| {
        let read = completion.read();
        let data = completion.into_buffer().freeze().slice(..read);
        write_all(channel, data, 0, echo_bytes);
    });
    if submitted.is_err() {
        debug!(remote = reader.remote_name(), "echo connection finished");
    }
}

fn echo_messages(queue: MessageQueue) {
    debug!(remote = queue.remote_name(), "echo queue accepted");
    let echo = queue.clone();
    queue.set_listener(move |event| match event {
        QueueEvent::Received(payload) => {
            if let Err(err) = echo.send(&payload) {
                debug!(remote = echo.remote_name(), error = %err, "echo send failed");
            }
        }
        QueueEvent::Closed => debug!(remote = echo.remote_name(), "echo queue closed"),
    });
}

fn exchange_bytes(channel: Channel, mut run: ClientRun) {
    let Some(message) = run.next_message() else {
        run.finish();
        channel.disconnect();
        return;
    };

    // Read while writing: the echo of a message larger than the buffer
    // starts coming back before the write completes.
    let expected = message.len();
    write_all(channel.clone(), message, 0, |_| {});
    read_exact(channel, BytesMut::zeroed(expected), 0, move |channel, echoed| {
        run.check(&echoed);
        exchange_bytes(channel, run);
    });
}

fn exchange_messages(queue: MessageQueue, mut run: ClientRun) {
    if !send_next(&queue, &mut run) {
        return;
    }

    let sender = queue.clone();
    let run = Mutex::new(run);
    queue.set_listener(move |event| {
        let mut run = run.lock().unwrap_or_else(PoisonError::into_inner);
        match event {
            QueueEvent::Received(payload) => {
                run.check(&payload);
                send_next(&sender, &mut run);
            }
            QueueEvent::Closed => run.finish(),
        }
    });
}

/// Send the next message, or wrap up. Returns whether one was sent.
fn send_next(queue: &MessageQueue, run: &mut ClientRun) -> bool {
    let Some(message) = run.next_message() else {
        run.finish();
        queue.close();
        return false;
    };
    match queue.send(&message) {
        Ok(()) => true,
        Err(err) => {
            warn!(client = %run.name, error = %err, "send failed");
            run.finish();
            queue.close();
            false
        }
    }
}

fn write_all<F>(channel: Channel, data: Bytes, offset: usize, done: F)
where
    F: FnOnce(Channel) + Send + 'static,
{
    let length = data.len() - offset;
    let writer = channel.clone();
    let submitted = writer.write(data, offset, length, move |completion| {
        let offset = completion.offset() + completion.written();
        let data = completion.into_buffer();
        if offset < data.len() {
            write_all(channel, data, offset, done);
        } else {
            done(channel);
        }
    });
    if let Err(err) = submitted {
        debug!(remote = writer.remote_name(), error = %err, "write not submitted");
    }
}

fn read_exact<F>(channel: Channel, buf: BytesMut, filled: usize, done: F)
where
    F: FnOnce(Channel, BytesMut) + Send + 'static,
{
    if filled == buf.len() {
        return done(channel, buf);
    }

    let remaining = buf.len() - filled;
    let reader = channel.clone();
    let submitted = reader.read(buf, filled, remaining, move |completion| {
        let filled = filled + completion.read();
        read_exact(channel, completion.into_buffer(), filled, done);
    });
    if let Err(err) = submitted {
        debug!(remote = reader.remote_name(), error = %err, "read not submitted");
    }
}

/// One client's progress. Reports its counters exactly once, at the latest
/// when dropped, so a client whose connection went away still shows up.
struct ClientRun {
    name: String,
    pending: VecDeque<Bytes>,
    in_flight: Option<Bytes>,
    sent: usize,
    matched: usize,
    started: Instant,
    reporter: Option<Sender<ClientReport>>,
}

impl ClientRun {
    fn new(name: &str, args: &EchoArgs, reporter: Sender<ClientReport>) -> Self {
        Self {
            name: name.to_string(),
            pending: (0..args.messages)
                .map(|seq| message(name, seq, args.message_size))
                .collect(),
            in_flight: None,
            sent: 0,
            matched: 0,
            started: Instant::now(),
            reporter: Some(reporter),
        }
    }

    fn next_message(&mut self) -> Option<Bytes> {
        let message = self.pending.pop_front()?;
        self.sent += 1;
        self.in_flight = Some(message.clone());
        Some(message)
    }

    fn check(&mut self, echoed: &[u8]) {
        match self.in_flight.take() {
            Some(expected) if expected.as_ref() == echoed => self.matched += 1,
            _ => warn!(client = %self.name, seq = self.sent, "echo mismatch"),
        }
    }

    fn finish(&mut self) {
        let Some(reporter) = self.reporter.take() else {
            return;
        };
        let report = ClientReport {
            client: self.name.clone(),
            sent: self.sent,
            matched: self.matched,
            elapsed_ms: elapsed_ms(self.started),
        };
        debug!(client = %report.client, sent = report.sent, matched = report.matched, "client finished");
        let _ = reporter.send(report);
    }
}

impl Drop for ClientRun {
    fn drop(&mut self) {
        self.finish();
    }
}

fn client_name(index: usize) -> String {
    format!("client-{index}")
}

/// Deterministic message of exactly `size` bytes, distinct per client and sequence number.
fn message(client: &str, seq: usize, size: usize) -> Bytes {
    let mut data = format!("{client}#{seq};").into_bytes();
    let mut fill = 0u8;
    while data.len() < size {
        data.push(b'a' + fill % 26);
        fill = fill.wrapping_add(1);
    }
    data.truncate(size);
    Bytes::from(data)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(mode: EchoMode) -> EchoArgs {
        EchoArgs {
            clients: 3,
            messages: 5,
            message_size: 100,
            port: 1234,
            buffer_capacity: 16,
            mode,
            timeout: "10s".to_string(),
        }
    }

    fn scenario(args: &EchoArgs) -> EchoReport {
        let executor = Executor::spawn("echo-test").expect("executor should start");
        let report = run_scenario(args, &executor, Duration::from_secs(10))
            .expect("scenario should run");
        executor.shutdown();
        report
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_bad_input() {
        for input in ["", "0s", "abc", "5m"] {
            let err = parse_duration(input).expect_err("duration should be rejected");
            assert_eq!(err.code, USAGE);
        }
    }

    #[test]
    fn messages_have_exact_size_and_differ() {
        assert_eq!(message("client-0", 0, 64).len(), 64);
        assert_eq!(message("client-0", 0, 3).as_ref(), b"cli");
        assert!(message("client-0", 0, 0).is_empty());
        assert_ne!(message("client-0", 1, 64), message("client-0", 2, 64));
        assert_ne!(message("client-0", 1, 64), message("client-1", 1, 64));
    }

    #[test]
    fn validate_rejects_bad_arguments() {
        let mut bad = args(EchoMode::Queue);
        bad.clients = 0;
        assert_eq!(validate(&bad).unwrap_err().code, USAGE);

        let mut bad = args(EchoMode::Queue);
        bad.buffer_capacity = 1;
        assert_eq!(validate(&bad).unwrap_err().code, USAGE);

        let mut bad = args(EchoMode::Queue);
        bad.message_size = DEFAULT_MAX_PAYLOAD + 1;
        assert_eq!(validate(&bad).unwrap_err().code, DATA_INVALID);

        assert!(validate(&args(EchoMode::Channel)).is_ok());
    }

    #[test]
    fn channel_mode_echoes_every_message() {
        let report = scenario(&args(EchoMode::Channel));
        assert!(report.all_matched(), "{report:?}");
        assert_eq!(report.total_sent, 15);
        assert_eq!(report.clients.len(), 3);
        assert_eq!(report.clients[0].client, "client-0");
    }

    #[test]
    fn queue_mode_echoes_every_message() {
        let report = scenario(&args(EchoMode::Queue));
        assert!(report.all_matched(), "{report:?}");
        assert_eq!(report.total_matched, 15);
        assert_eq!(report.mode, "queue");
    }

    #[test]
    fn zero_messages_finish_immediately() {
        let mut quiet = args(EchoMode::Queue);
        quiet.messages = 0;
        let report = scenario(&quiet);
        assert!(report.all_matched());
        assert_eq!(report.total_sent, 0);
    }
}
