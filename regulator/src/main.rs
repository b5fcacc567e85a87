use clap::{Arg, ArgAction, ArgMatches, Command};
use jeflog::{pass, task};
use regulator::{
  console,
  emulator::EmulatedVessel,
  sample_log::CsvSink,
  transport::{ActuatorTransport, SensorTransport},
  ControlSupervisor,
  RegulatorConfig,
};
use std::{io, path::PathBuf};

fn main() -> anyhow::Result<()> {
  let matches = Command::new("regulator")
    .about("Holds a vessel at a target pressure with an inlet and an outlet valve.")
    .arg(
      Arg::new("config")
        .long("config")
        .short('c')
        .value_parser(clap::value_parser!(PathBuf))
        .help("JSON configuration file"),
    )
    .arg(
      Arg::new("emulate")
        .long("emulate")
        .action(ArgAction::SetTrue)
        .help("Run against an emulated vessel instead of hardware"),
    )
    .arg(
      Arg::new("pressure_max")
        .long("pressure-max")
        .value_parser(clap::value_parser!(f64))
        .help("Sensor full scale in kPa"),
    )
    .arg(
      Arg::new("tolerance")
        .long("tolerance")
        .value_parser(clap::value_parser!(f64))
        .help("Dead band either side of the setpoint in kPa"),
    )
    .arg(
      Arg::new("log_dir")
        .long("log-dir")
        .value_parser(clap::value_parser!(PathBuf)),
    )
    .arg(
      Arg::new("log_file")
        .long("log-file")
        .short('o')
        .value_parser(clap::value_parser!(PathBuf)),
    )
    .arg(
      Arg::new("spi_bus")
        .long("spi-bus")
        .default_value("/dev/spidev0.0")
        .help("spidev device of the pressure ADC"),
    )
    .get_matches();

  let config = load_config(&matches)?;
  let log_path = config.log_path();

  task!("Session log will be written to {}.", log_path.display());

  if matches.get_flag("emulate") {
    let vessel =
      EmulatedVessel::new(0.0, config.inlet_channel, config.outlet_channel);

    return operate(config, vessel.sensor(), vessel.valves(), log_path);
  }

  #[cfg(feature = "hardware")]
  {
    use regulator::hardware::{GpioValves, SpiPressureSensor};

    let bus = matches
      .get_one::<String>("spi_bus")
      .map(String::as_str)
      .unwrap_or("/dev/spidev0.0");

    let sensor = SpiPressureSensor::open(bus)?;
    let valves = GpioValves::open(&[config.inlet_channel, config.outlet_channel])?;

    operate(config, sensor, valves, log_path)
  }

  #[cfg(not(feature = "hardware"))]
  {
    use jeflog::fail;
    use std::process;

    fail!("Built without hardware support. Pass --emulate to run against a model.");
    process::exit(1);
  }
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<RegulatorConfig> {
  let mut config = match matches.get_one::<PathBuf>("config") {
    Some(path) => RegulatorConfig::from_file(path)?,
    None => RegulatorConfig::default(),
  };

  if let Some(&pressure_max) = matches.get_one::<f64>("pressure_max") {
    config.pressure_max = pressure_max;
  }

  if let Some(&tolerance) = matches.get_one::<f64>("tolerance") {
    config.pressure_tolerance = tolerance;
  }

  if let Some(log_dir) = matches.get_one::<PathBuf>("log_dir") {
    config.log_dir = log_dir.clone();
  }

  if let Some(log_file) = matches.get_one::<PathBuf>("log_file") {
    config.log_file = Some(log_file.clone());
  }

  config.validate()?;
  Ok(config)
}

fn operate(
  config: RegulatorConfig,
  sensor: impl SensorTransport + 'static,
  actuator: impl ActuatorTransport + 'static,
  log_path: PathBuf,
) -> anyhow::Result<()> {
  let supervisor =
    ControlSupervisor::new(config, sensor, actuator, CsvSink::new(log_path))?;

  pass!("Regulator ready.");

  let stdin = io::stdin();
  console::run(&supervisor, stdin.lock(), io::stdout())?;

  supervisor.stop();
  Ok(())
}
