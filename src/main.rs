// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::Duration;

use anyhow::Context as _;
use clap::{Arg, ArgAction, ArgGroup, ArgMatches, Command};
use modbus_cli::{
    Address, Client, Error, Number, NumberKind, RegisterValue, SessionConfig, TcpSession, UnitId,
    ValueType, WordOrder,
};

/// Invalid combination of command line arguments.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct UsageError(String);

fn usage(msg: impl Into<String>) -> UsageError {
    UsageError(msg.into())
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Operation {
    ReadCoil,
    WriteCoil(bool),
    ReadRegister(ValueType),
    WriteRegister(RegisterValue),
}

/// A fully validated command line.
#[derive(Debug, Clone, PartialEq)]
struct Invocation {
    host: String,
    port: u16,
    unit_id: UnitId,
    timeout: Duration,
    address: Address,
    word_order: WordOrder,
    operation: Operation,
}

fn command() -> Command {
    Command::new("modbus-cli")
        .about("Modbus interaction from the command line to read/write coils and registers")
        .arg(
            Arg::new("read")
                .long("read")
                .short('r')
                .help("Read from the given Modbus address")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("write")
                .long("write")
                .short('w')
                .help("Write to the given Modbus address")
                .action(ArgAction::SetTrue),
        )
        .group(ArgGroup::new("action").args(["read", "write"]).required(true))
        .arg(
            Arg::new("ip")
                .long("ip")
                .help("The IP address or host name of the Modbus device")
                .value_name("IP")
                .required(true),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .help("The port of the Modbus service")
                .value_name("PORT")
                .default_value("502")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("address")
                .long("address")
                .short('a')
                .help("Target address on the Modbus device")
                .value_name("ADDR")
                .required(true)
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("register")
                .long("register")
                .help("Select a holding register as the target")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("coil")
                .long("coil")
                .short('c')
                .help("Select a coil as the target")
                .action(ArgAction::SetTrue),
        )
        .group(ArgGroup::new("target").args(["register", "coil"]).required(true))
        .arg(
            Arg::new("size")
                .long("size")
                .short('s')
                .help("The register size in bits")
                .value_name("BITS")
                .value_parser(["16", "32", "64"]),
        )
        .arg(
            Arg::new("datatype")
                .long("datatype")
                .short('d')
                .help("The data type stored in the register")
                .value_name("TYPE")
                .value_parser(["FLOAT", "INT", "UINT"]),
        )
        .arg(
            Arg::new("value")
                .long("value")
                .short('v')
                .help("The new value to store at the given address")
                .value_name("VALUE")
                .allow_hyphen_values(true),
        )
        .arg(
            Arg::new("unit")
                .long("unit")
                .help("Modbus unit identifier of the device")
                .value_name("ID")
                .default_value("1")
                .value_parser(clap::value_parser!(u8)),
        )
        .arg(
            Arg::new("word-order")
                .long("word-order")
                .help("Order of the registers of 32 and 64 bit values")
                .value_name("ORDER")
                .default_value("big")
                .value_parser(["big", "little"]),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .help("Connect and response timeout in milliseconds")
                .value_name("MS")
                .default_value("5000")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

/// Check the arguments and turn them into an [`Invocation`].
///
/// Nothing is sent to the device if this fails.
fn parse_invocation(matches: &ArgMatches) -> Result<Invocation, UsageError> {
    let write = matches.get_flag("write");
    let coil = matches.get_flag("coil");
    let value = matches.get_one::<String>("value");
    let size = matches.get_one::<String>("size");
    let datatype = matches.get_one::<String>("datatype");

    if write && value.is_none() {
        return Err(usage("--write requires the --value argument"));
    }
    if !write && value.is_some() {
        return Err(usage("--read does not accept the --value argument"));
    }

    let operation = if coil {
        if size.is_some() {
            return Err(usage("--coil does not utilize the --size argument"));
        }
        if datatype.is_some() {
            return Err(usage("--coil does not utilize the --datatype argument"));
        }
        match value.map(String::as_str) {
            None => Operation::ReadCoil,
            Some("0") => Operation::WriteCoil(false),
            Some("1") => Operation::WriteCoil(true),
            Some(_) => {
                return Err(usage(
                    "--coil requires --value to be 1 (true) or 0 (false)",
                ));
            }
        }
    } else {
        let Some(size) = size else {
            return Err(usage("--register requires the --size argument"));
        };
        let Some(datatype) = datatype else {
            return Err(usage("--register requires the --datatype argument"));
        };
        let width = size
            .parse::<u16>()
            .map_err(|_| usage(format!("invalid register size: {size}")))?;
        let kind = match datatype.as_str() {
            "FLOAT" => NumberKind::Float,
            "INT" => NumberKind::Int,
            _ => NumberKind::Uint,
        };
        let ty = ValueType::from_width(width, kind).map_err(|err| usage(err.to_string()))?;
        match value {
            None => Operation::ReadRegister(ty),
            Some(value) => {
                let number = value
                    .parse::<Number>()
                    .map_err(|err| usage(err.to_string()))?;
                let value = ty.coerce(number).map_err(|err| usage(err.to_string()))?;
                Operation::WriteRegister(value)
            }
        }
    };

    let word_order = match matches.get_one::<String>("word-order").map(String::as_str) {
        Some("little") => WordOrder::LittleEndianWords,
        _ => WordOrder::BigEndianWords,
    };
    let host = matches
        .get_one::<String>("ip")
        .cloned()
        .ok_or_else(|| usage("--ip is required"))?;
    let address = matches
        .get_one::<u16>("address")
        .copied()
        .ok_or_else(|| usage("--address is required"))?;

    Ok(Invocation {
        host,
        port: matches.get_one::<u16>("port").copied().unwrap_or(502),
        unit_id: matches.get_one::<u8>("unit").copied().unwrap_or(1),
        timeout: Duration::from_millis(matches.get_one::<u64>("timeout").copied().unwrap_or(5000)),
        address,
        word_order,
        operation,
    })
}

/// Registers covered by a value, e.g. `100-101`.
fn register_span(address: Address, ty: ValueType) -> String {
    let last = u32::from(address) + ty.word_count() as u32 - 1;
    if last == u32::from(address) {
        address.to_string()
    } else {
        format!("{address}-{last}")
    }
}

/// Show what the device holds after a write that failed.
fn report_failed_change(target: &str, err: &Error) {
    if let Error::ChangeFailed {
        previous, current, ..
    } = err
    {
        match current {
            Some(current) => eprintln!("Error: {target} changed from {previous} to {current}"),
            None => eprintln!("Error: {target} was {previous}, reading it back failed"),
        }
    }
}

fn run(invocation: &Invocation) -> anyhow::Result<()> {
    let Invocation {
        host,
        port,
        unit_id,
        timeout,
        address,
        word_order,
        operation,
    } = invocation;
    let (address, word_order) = (*address, *word_order);
    log::debug!("Using {word_order} word order for unit {unit_id}");

    let config = SessionConfig::new(host.as_str())
        .with_port(*port)
        .with_timeout(*timeout);
    let session = TcpSession::connect(config)
        .with_context(|| format!("Unable to connect to {host}:{port}"))?;
    let mut client = Client::new(session, *unit_id);

    match *operation {
        Operation::ReadCoil => {
            let state = client
                .read_coil(address)
                .with_context(|| format!("Unable to read coil {address}"))?;
            println!("Success: {host}:{port} Coil {address} = {state}");
        }
        Operation::WriteCoil(state) => {
            let change = client
                .change_coil(address, state)
                .inspect_err(|err| {
                    report_failed_change(&format!("{host}:{port} Coil {address}"), err);
                })
                .with_context(|| format!("Unable to set coil {address}"))?;
            println!(
                "Success: {host}:{port} Coil {address} changed from {} to {}",
                change.previous, change.current
            );
        }
        Operation::ReadRegister(ty) => {
            let span = register_span(address, ty);
            let value = client
                .read_register(address, ty, word_order)
                .with_context(|| format!("Unable to read register {span}"))?;
            println!("Success: {host}:{port} Register {span} = {value}");
        }
        Operation::WriteRegister(value) => {
            let span = register_span(address, value.value_type());
            let change = client
                .change_register(address, value, word_order)
                .inspect_err(|err| {
                    report_failed_change(&format!("{host}:{port} Register {span}"), err);
                })
                .with_context(|| format!("Unable to set register {span}"))?;
            println!(
                "Success: {host}:{port} Register {span} changed from {} to {}",
                change.previous, change.current
            );
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let matches = command().get_matches();
    let invocation = parse_invocation(&matches)?;
    log::debug!("{invocation:?}");
    run(&invocation)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Invocation, UsageError> {
        let matches = command()
            .try_get_matches_from(std::iter::once("modbus-cli").chain(args.iter().copied()))
            .unwrap();
        parse_invocation(&matches)
    }

    fn usage_error(args: &[&str]) -> String {
        parse(args).unwrap_err().to_string()
    }

    #[test]
    fn read_coil() {
        let invocation = parse(&["-r", "--ip", "10.0.0.5", "-a", "7", "-c"]).unwrap();
        assert_eq!(
            invocation,
            Invocation {
                host: "10.0.0.5".to_owned(),
                port: 502,
                unit_id: 1,
                timeout: Duration::from_secs(5),
                address: 7,
                word_order: WordOrder::BigEndianWords,
                operation: Operation::ReadCoil,
            }
        );
    }

    #[test]
    fn write_coil() {
        let invocation = parse(&["-w", "--ip", "plc", "-a", "7", "-c", "-v", "1"]).unwrap();
        assert_eq!(invocation.operation, Operation::WriteCoil(true));
        let invocation = parse(&["-w", "--ip", "plc", "-a", "7", "-c", "-v", "0"]).unwrap();
        assert_eq!(invocation.operation, Operation::WriteCoil(false));
    }

    #[test]
    fn write_float_register() {
        let invocation = parse(&[
            "-w", "--ip", "plc", "--port", "1502", "-a", "100", "--register", "-s", "32", "-d",
            "FLOAT", "-v", "98.6",
        ])
        .unwrap();
        assert_eq!(invocation.port, 1502);
        assert_eq!(
            invocation.operation,
            Operation::WriteRegister(RegisterValue::Float32(98.6))
        );
    }

    #[test]
    fn write_negative_integer() {
        let invocation = parse(&[
            "-w", "--ip", "plc", "-a", "3", "--register", "-s", "16", "-d", "INT", "-v", "-5",
        ])
        .unwrap();
        assert_eq!(
            invocation.operation,
            Operation::WriteRegister(RegisterValue::Int16(-5))
        );
    }

    #[test]
    fn read_with_little_endian_words() {
        let invocation = parse(&[
            "-r",
            "--ip",
            "plc",
            "-a",
            "10",
            "--register",
            "-s",
            "64",
            "-d",
            "UINT",
            "--word-order",
            "little",
            "--unit",
            "17",
            "--timeout",
            "250",
        ])
        .unwrap();
        assert_eq!(invocation.word_order, WordOrder::LittleEndianWords);
        assert_eq!(invocation.unit_id, 17);
        assert_eq!(invocation.timeout, Duration::from_millis(250));
        assert_eq!(
            invocation.operation,
            Operation::ReadRegister(ValueType::UInt64)
        );
    }

    #[test]
    fn write_requires_value() {
        let msg = usage_error(&["-w", "--ip", "plc", "-a", "7", "-c"]);
        assert!(msg.contains("requires the --value"));
    }

    #[test]
    fn read_rejects_value() {
        let msg = usage_error(&["-r", "--ip", "plc", "-a", "7", "-c", "-v", "1"]);
        assert!(msg.contains("does not accept"));
    }

    #[test]
    fn coil_value_must_be_binary() {
        let msg = usage_error(&["-w", "--ip", "plc", "-a", "7", "-c", "-v", "2"]);
        assert!(msg.contains("1 (true) or 0 (false)"));
    }

    #[test]
    fn register_requires_size_and_type() {
        let msg = usage_error(&["-r", "--ip", "plc", "-a", "7", "--register", "-d", "INT"]);
        assert!(msg.contains("--size"));
        let msg = usage_error(&["-r", "--ip", "plc", "-a", "7", "--register", "-s", "16"]);
        assert!(msg.contains("--datatype"));
    }

    #[test]
    fn coil_rejects_size() {
        let msg = usage_error(&["-r", "--ip", "plc", "-a", "7", "-c", "-s", "16"]);
        assert!(msg.contains("--size"));
    }

    #[test]
    fn values_are_checked_before_connecting() {
        let msg = usage_error(&[
            "-w", "--ip", "plc", "-a", "7", "--register", "-s", "32", "-d", "UINT", "-v", "-1",
        ]);
        assert!(msg.contains("out of range"));
        let msg = usage_error(&[
            "-w", "--ip", "plc", "-a", "7", "--register", "-s", "32", "-d", "INT", "-v", "1.5",
        ]);
        assert!(msg.contains("not an integer"));
        let msg = usage_error(&[
            "-w", "--ip", "plc", "-a", "7", "--register", "-s", "32", "-d", "INT", "-v", "abc",
        ]);
        assert!(msg.contains("Invalid number"));
    }

    #[test]
    fn half_precision_is_unsupported() {
        let msg = usage_error(&[
            "-r",
            "--ip",
            "plc",
            "-a",
            "7",
            "--register",
            "-s",
            "16",
            "-d",
            "FLOAT",
        ]);
        assert!(msg.contains("Unsupported register type"));
    }

    #[test]
    fn conflicting_flags_are_rejected_by_clap() {
        assert!(
            command()
                .try_get_matches_from(["modbus-cli", "-r", "-w", "--ip", "plc", "-a", "1", "-c"])
                .is_err()
        );
        assert!(
            command()
                .try_get_matches_from(["modbus-cli", "-r", "--ip", "plc", "-a", "1"])
                .is_err()
        );
        assert!(
            command()
                .try_get_matches_from([
                    "modbus-cli", "-r", "--ip", "plc", "-a", "1", "--register", "-s", "8"
                ])
                .is_err()
        );
    }

    #[test]
    fn register_spans() {
        assert_eq!(register_span(100, ValueType::UInt16), "100");
        assert_eq!(register_span(100, ValueType::Float32), "100-101");
        assert_eq!(register_span(65_532, ValueType::Float64), "65532-65535");
    }

    #[test]
    fn command_is_consistent() {
        command().debug_assert();
    }
}
