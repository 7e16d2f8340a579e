#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_net::{Runner, StackResources};
use embedded_hal_bus::spi::ExclusiveDevice;
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::rng::Rng;
use esp_hal::spi::Mode;
use esp_hal::spi::master::{Config, Spi};
use esp_hal::time::Rate;
use esp_hal::timer::timg::TimerGroup;
use esp_hal::uart::{Config as UartConfig, UartTx};
use esp_radio::wifi::WifiDevice;
use log::{LevelFilter, info};
use static_cell::StaticCell;

use checkin_core::{CheckinStation, DeviceConfig, LedIndicator, SystemClock};
use checkin_firmware::config::device_config;
use checkin_firmware::console::{CONSOLE_BAUD, SerialConsole};
use checkin_firmware::reader::Mfrc522Reader;
use checkin_firmware::transport::TcpTransport;
use checkin_firmware::wifi::EspWifiLink;

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
esp_bootloader_esp_idf::esp_app_desc!();

/// DHCP, DNS and one TCP socket
const NET_SOCKETS: usize = 3;

static CONFIG: StaticCell<DeviceConfig<'static>> = StaticCell::new();
static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
static NET_RESOURCES: StaticCell<StackResources<NET_SOCKETS>> = StaticCell::new();

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) -> ! {
    runner.run().await
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let config: &'static DeviceConfig<'static> =
        CONFIG.init(device_config().expect("invalid station configuration"));
    log::set_max_level(config.features.log_ceiling(LevelFilter::Info));

    let hal_config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(hal_config);

    esp_alloc::heap_allocator!(size: 72 * 1024);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("Embassy initialized");

    // --- Network ----------------------------------------------------------
    let radio = RADIO.init(esp_radio::init().expect("Failed to initialize radio controller"));
    let (controller, interfaces) = esp_radio::wifi::new(radio, peripherals.WIFI, Default::default())
        .expect("Failed to initialize Wi-Fi controller");

    let rng = Rng::new();
    let seed = (u64::from(rng.random()) << 32) | u64::from(rng.random());
    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        NET_RESOURCES.init(StackResources::new()),
        seed,
    );
    spawner.spawn(net_task(runner).expect("network task spawned twice"));

    let link = EspWifiLink::new(controller, stack, &config.network)
        .expect("Failed to configure Wi-Fi station");
    let transport = TcpTransport::new(stack);

    // --- Serial console on UART0 (TX GPIO1, the USB bridge) ---------------
    let serial_tx = UartTx::new(
        peripherals.UART0,
        UartConfig::default().with_baudrate(CONSOLE_BAUD),
    )
    .expect("Failed to configure UART0")
    .with_tx(peripherals.GPIO1);
    let console = SerialConsole::new(serial_tx);

    // --- MFRC522 on VSPI (SCK 18, MISO 19, MOSI 23) ----------------------
    let spi_bus = Spi::new(
        peripherals.SPI3,
        Config::default()
            .with_frequency(Rate::from_mhz(4))
            .with_mode(Mode::_0),
    )
    .expect("Failed to configure SPI")
    .with_sck(peripherals.GPIO18)
    .with_miso(peripherals.GPIO19)
    .with_mosi(peripherals.GPIO23);

    // Wiring matches `PinAssignments::default()`, which the boot banner reports.
    let ss = Output::new(peripherals.GPIO21, Level::High, OutputConfig::default());
    // Held high: reader out of reset for the lifetime of the firmware.
    let _rst = Output::new(peripherals.GPIO22, Level::High, OutputConfig::default());
    let spi_device =
        ExclusiveDevice::new_no_delay(spi_bus, ss).expect("Failed to claim SPI device");
    let reader = Mfrc522Reader::new(spi_device).expect("MFRC522 not responding");

    // --- Status LEDs ------------------------------------------------------
    let success_led = Output::new(peripherals.GPIO2, Level::Low, OutputConfig::default());
    let error_led = Output::new(peripherals.GPIO4, Level::Low, OutputConfig::default());
    let indicator = LedIndicator::new(success_led, error_led);

    let mut station = CheckinStation::new(
        config,
        SystemClock,
        reader,
        link,
        transport,
        indicator,
        console,
    )
    .expect("invalid station configuration");

    station.run().await
}
