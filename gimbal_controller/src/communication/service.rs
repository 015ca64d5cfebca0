use anyhow::Context as _;
use std::io;

use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};
use tracing::{debug, info, warn};

use crate::{
    command_executor::command_sender::{GimbalCommandSender, SendResult},
    communication::commands::{Request, parse_request},
    config::ServerConfig,
    controller::{error::OverrideError, status::GimbalStatus},
};

const VERSION: &str = concat!(env!("CARGO_PKG_NAME"), "-", env!("CARGO_PKG_VERSION"));
const REPORT_OK: &str = "RPRT 0\n";
const REPORT_FAILED: &str = "RPRT -1\n";

/// Longest line accepted from a client, terminator excluded. Longer lines are dropped.
pub const MAX_LINE_LENGTH: usize = 256;

pub struct Service {
    config: ServerConfig,
    gimbal: GimbalCommandSender,
}

impl Service {
    pub fn new(config: ServerConfig, gimbal: GimbalCommandSender) -> Self {
        Self { config, gimbal }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.config.listen)
            .await
            .with_context(|| format!("Failed to bind to {}", self.config.listen))?;
        info!(address = %self.config.listen, "Listening for rotator clients");

        loop {
            let (socket, peer) = listener
                .accept()
                .await
                .context("Failed to accept connection")?;
            debug!(%peer, "Client connected");

            let gimbal = self.gimbal.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(socket, gimbal).await {
                    warn!(%peer, "Connection closed with error: {}", e);
                }
            });
        }
    }
}

async fn handle_connection(socket: TcpStream, gimbal: GimbalCommandSender) -> io::Result<()> {
    let (reader, mut writer) = socket.into_split();
    let mut reader = BufReader::new(reader);
    // Room for the longest line plus a CR LF terminator.
    let limit = MAX_LINE_LENGTH + 2;
    let mut buffer = Vec::with_capacity(limit);

    loop {
        buffer.clear();
        let read = (&mut reader)
            .take(limit as u64)
            .read_until(b'\n', &mut buffer)
            .await?;
        if read == 0 {
            return Ok(());
        }

        let terminated = buffer.last() == Some(&b'\n');
        if !terminated && read == limit {
            warn!(limit, "Dropping overlong line");
            discard_line(&mut reader).await?;
            continue;
        }
        if buffer.trim_ascii_end().len() > MAX_LINE_LENGTH {
            warn!(length = buffer.len(), "Dropping overlong line");
            continue;
        }

        let line = String::from_utf8_lossy(&buffer);
        let Some(request) = parse_request(&line) else {
            debug!(line = %line.trim_end(), "Ignoring unrecognised line");
            continue;
        };

        let reply = respond(request, &gimbal).await;
        writer.write_all(reply.as_bytes()).await?;
    }
}

/// Skips input up to and including the next newline without buffering it.
async fn discard_line(reader: &mut (impl AsyncBufRead + Unpin)) -> io::Result<()> {
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(());
        }
        match available.iter().position(|&byte| byte == b'\n') {
            Some(end) => {
                reader.consume(end + 1);
                return Ok(());
            }
            None => {
                let skipped = available.len();
                reader.consume(skipped);
            }
        }
    }
}

/// Produces the full reply, trailing newline included, for one parsed line.
pub async fn respond(request: Result<Request, OverrideError>, gimbal: &GimbalCommandSender) -> String {
    let request = match request {
        Ok(request) => request,
        Err(e) => return format!("error={}\n", e),
    };

    let operator = request.is_operator();

    match execute(request, gimbal).await {
        Ok(reply) => reply,
        Err(e) if operator => format!("error={}\n", e),
        Err(e) => {
            warn!("Rotator command failed: {}", e);
            REPORT_FAILED.to_string()
        }
    }
}

async fn execute(request: Request, gimbal: &GimbalCommandSender) -> SendResult<String> {
    match request {
        Request::ReportPosition => position_report(gimbal).await,
        Request::Move { azimuth, elevation } => {
            let outcome = gimbal.move_to_az_el(azimuth, elevation).await?;
            debug!(?outcome, "Control cycle");
            position_report(gimbal).await
        }
        Request::Park => {
            gimbal.move_to_az_el(0.0, 0.0).await?;
            position_report(gimbal).await
        }
        Request::Home => {
            gimbal.move_home().await?;
            position_report(gimbal).await
        }
        Request::Version => Ok(format!("VE{}\n", VERSION)),
        Request::StatusItem(item) => status_item(item, gimbal).await,
        Request::RotatorStatus => {
            let report = gimbal.status().await?;
            let code = match report.status {
                GimbalStatus::NotFound => 8,
                _ if report.calibrating => 2,
                _ => 1,
            };
            Ok(format!("GS{}\n", code))
        }
        Request::RotatorError => {
            let code = match gimbal.status().await?.status {
                GimbalStatus::NotFound => 1,
                _ => 0,
            };
            Ok(format!("GE{}\n", code))
        }
        Request::Override { field, value } => {
            gimbal.override_field(field, value).await?;
            Ok(REPORT_OK.to_string())
        }
        Request::Calibrate => {
            gimbal.calibrate().await?;
            Ok(REPORT_OK.to_string())
        }
        Request::ResetCalibration => {
            gimbal.reset_calibration().await?;
            Ok(REPORT_OK.to_string())
        }
        Request::Status => {
            let mut lines = gimbal.status().await?.to_lines();
            lines.extend(gimbal.sensor_status().await?.to_lines());
            let mut reply = lines.join("\n");
            reply.push('\n');
            Ok(reply)
        }
        Request::Declination(degrees) => {
            gimbal.set_declination(degrees).await?;
            Ok(REPORT_OK.to_string())
        }
        Request::SaveSensorCalibration => {
            gimbal.save_sensor_calibration().await?;
            Ok(REPORT_OK.to_string())
        }
    }
}

async fn position_report(gimbal: &GimbalCommandSender) -> SendResult<String> {
    let orientation = gimbal.orientation().await?;
    Ok(format!(
        "AZ{:.1} EL{:.1}\n",
        orientation.azimuth, orientation.elevation
    ))
}

async fn status_item(item: u8, gimbal: &GimbalCommandSender) -> SendResult<String> {
    let value = match item {
        0 => match gimbal.temperature().await? {
            Some(celsius) => format!("{:.1}", celsius),
            None => return Ok(REPORT_FAILED.to_string()),
        },
        1 | 2 => {
            let report = gimbal.status().await?;
            let motor = &report.motors[usize::from(item - 1)];
            u8::from(motor.at_endstop).to_string()
        }
        3 => format!("{:.1}", gimbal.orientation().await?.azimuth),
        4 => format!("{:.1}", gimbal.orientation().await?.elevation),
        5..=8 => "0".to_string(),
        _ => return Ok(REPORT_FAILED.to_string()),
    };
    Ok(format!("IP{},{}\n", item, value))
}

#[cfg(test)]
mod tests {
    use utilities::command_executor::CommandExecutor;

    use super::*;
    use crate::{
        command_executor::GimbalHandler,
        controller::{
            calibration::CALIBRATION_STEPS,
            motor::MotorIndex,
        },
        mocks::Rig,
        store::{CalibrationRecord, MotorRecord},
    };
    use bno055::OFFSET_BYTES;

    fn calibrated_rig() -> Rig {
        Rig::with_record(CalibrationRecord {
            best_az_motor: 0,
            step: CALIBRATION_STEPS,
            motors: [
                MotorRecord {
                    min_pulse: 1000,
                    max_pulse: 2000,
                    az_scale: 10.0,
                    el_scale: 40.0,
                },
                MotorRecord {
                    min_pulse: 1000,
                    max_pulse: 2000,
                    az_scale: 45.0,
                    el_scale: 10.0,
                },
            ],
            sensor: Default::default(),
        })
    }

    fn spawn(rig: &Rig) -> GimbalCommandSender {
        let executor = CommandExecutor::new(GimbalHandler::new(rig.controller()));
        let sender = GimbalCommandSender::new(executor.sender());
        executor.spawn().unwrap();
        sender
    }

    async fn send(line: &str, gimbal: &GimbalCommandSender) -> String {
        respond(parse_request(line).unwrap(), gimbal).await
    }

    #[tokio::test]
    async fn reports_position_with_one_decimal() {
        let rig = calibrated_rig();
        let gimbal = spawn(&rig);
        rig.sensor.push(123.44, 45.06);

        assert_eq!(send("AZ EL", &gimbal).await, "AZ123.4 EL45.1\n");
    }

    #[tokio::test]
    async fn move_runs_a_cycle_then_reports() {
        let rig = calibrated_rig();
        let gimbal = spawn(&rig);
        rig.sensor.push(100.0, 30.0);

        assert_eq!(send("AZ110.0 EL30.0", &gimbal).await, "AZ100.0 EL30.0\n");
        // First sample only primes the settle check.
        assert!(rig.actuator.commands().is_empty());
    }

    #[tokio::test]
    async fn version_and_status_items() {
        let rig = calibrated_rig();
        let gimbal = spawn(&rig);
        rig.sensor.push(200.0, 10.0);

        assert_eq!(send("VE", &gimbal).await, format!("VE{}\n", VERSION));
        assert_eq!(send("IP0", &gimbal).await, "IP0,31.0\n");
        assert_eq!(send("IP1", &gimbal).await, "IP1,0\n");
        assert_eq!(send("IP3", &gimbal).await, "IP3,200.0\n");
        assert_eq!(send("IP7", &gimbal).await, "IP7,0\n");
        assert_eq!(send("IP9", &gimbal).await, REPORT_FAILED);
        assert_eq!(send("GS", &gimbal).await, "GS1\n");
        assert_eq!(send("GE", &gimbal).await, "GE0\n");
    }

    #[tokio::test]
    async fn operator_overrides_and_status() {
        let rig = calibrated_rig();
        let gimbal = spawn(&rig);

        assert_eq!(send("motor0Pos=2000", &gimbal).await, REPORT_OK);
        assert_eq!(rig.actuator.last_for(MotorIndex::First), Some(2000));
        assert_eq!(send("IP1", &gimbal).await, "IP1,1\n");

        let status = send("status=", &gimbal).await;
        assert!(status.starts_with("motor0Pos=2000\n"));
        assert!(status.contains("\ncalibrating=false\nstatus=Servo 1 at Max!\n"));
        assert!(status.ends_with("sensorSaveReady=true\n"));

        assert_eq!(
            send("motor1Min=2500", &gimbal).await,
            "error=Lower limit 2500 must be below upper limit 2000\n"
        );
        assert_eq!(send("resetCalibration=1", &gimbal).await, REPORT_OK);
        assert!(
            send("status=", &gimbal)
                .await
                .contains("\nstatus=Servo 1 at Max!\n")
        );
    }

    #[tokio::test]
    async fn sensor_settings_are_applied_and_reported() {
        let rig = calibrated_rig();
        let gimbal = spawn(&rig);
        rig.sensor.set_offsets([9; OFFSET_BYTES]);

        assert_eq!(send("declination=-4.5", &gimbal).await, REPORT_OK);
        assert_eq!(rig.sensor.applied_declination(), -4.5);
        assert_eq!(send("saveSensorCalibration=", &gimbal).await, REPORT_OK);
        assert_eq!(
            rig.store.record().unwrap().sensor.offsets,
            Some([9; OFFSET_BYTES])
        );

        let status = send("status=", &gimbal).await;
        assert!(status.contains("\ndeclination=-4.50\n"));
        assert!(status.contains("\nsensorStatus=Ok\n"));
        assert!(status.contains("\nsensorSelfTestMcu=pass\n"));

        assert_eq!(
            send("declination=400", &gimbal).await,
            "error=Invalid value '400' for declination\n"
        );
    }

    #[tokio::test]
    async fn rotator_status_shows_calibration_in_progress() {
        let rig = Rig::new();
        let gimbal = spawn(&rig);
        rig.sensor.push_times(100.0, 20.0, 2);

        assert_eq!(send("GS", &gimbal).await, "GS1\n");
        rig.tick();
        send("AZ0 EL45", &gimbal).await;
        rig.tick();
        send("AZ0 EL45", &gimbal).await;
        assert_eq!(send("GS", &gimbal).await, "GS2\n");
        assert!(send("status=", &gimbal).await.contains("\ncalibrating=true\n"));
    }

    #[tokio::test]
    async fn parse_errors_reach_the_operator() {
        let rig = calibrated_rig();
        let gimbal = spawn(&rig);

        assert_eq!(
            send("motor0Max=lots", &gimbal).await,
            "error=Invalid value 'lots' for motor0Max\n"
        );
    }

    #[tokio::test]
    async fn missing_gimbal_is_reported() {
        let rig = calibrated_rig();
        let executor = CommandExecutor::new(GimbalHandler::new(rig.controller_without_actuator()));
        let gimbal = GimbalCommandSender::new(executor.sender());
        executor.spawn().unwrap();

        assert_eq!(send("GS", &gimbal).await, "GS8\n");
        assert_eq!(send("calibrate=", &gimbal).await, "error=No gimbal!\n");
        assert_eq!(
            send("saveSensorCalibration=", &gimbal).await,
            "error=Sensor has no calibration to save\n"
        );
        assert_eq!(send("motor0Pos=1500", &gimbal).await, "error=No gimbal!\n");
    }

    #[tokio::test]
    async fn stopped_executor_fails_rotator_commands() {
        let rig = calibrated_rig();
        let executor = CommandExecutor::new(GimbalHandler::new(rig.controller()));
        let gimbal = GimbalCommandSender::new(executor.sender());
        drop(executor);

        assert_eq!(send("AZ EL", &gimbal).await, REPORT_FAILED);
        assert_eq!(
            send("status=", &gimbal).await,
            "error=command executor is not running\n"
        );
    }

    #[tokio::test]
    async fn serves_lines_over_tcp() {
        let rig = calibrated_rig();
        let gimbal = spawn(&rig);
        rig.sensor.push(12.0, 34.0);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            handle_connection(socket, gimbal).await.unwrap();
        });

        let client = TcpStream::connect(address).await.unwrap();
        let (reader, mut writer) = client.into_split();
        let mut replies = BufReader::new(reader).lines();

        writer.write_all(b"ML\r\nAZ EL\r\n").await.unwrap();
        assert_eq!(replies.next_line().await.unwrap().unwrap(), "AZ12.0 EL34.0");
    }

    #[tokio::test]
    async fn overlong_lines_are_dropped_without_buffering() {
        let rig = calibrated_rig();
        let gimbal = spawn(&rig);
        rig.sensor.push(12.0, 34.0);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            handle_connection(socket, gimbal).await.unwrap();
        });

        let client = TcpStream::connect(address).await.unwrap();
        let (reader, mut writer) = client.into_split();
        let mut replies = BufReader::new(reader).lines();

        // A flood that never reaches a newline, then a request that must still be served.
        let flood = vec![b'A'; 64 * 1024];
        writer.write_all(b"AZ").await.unwrap();
        writer.write_all(&flood).await.unwrap();
        writer.write_all(b"\nAZ EL\n").await.unwrap();
        assert_eq!(replies.next_line().await.unwrap().unwrap(), "AZ12.0 EL34.0");
    }
}
