//! Info command implementation

use norfvb_core::{FlashBus, FlashFvb};

/// Print descriptor, geometry and attributes
pub fn run_info<B: FlashBus>(fvb: &FlashFvb<B>) {
    let d = fvb.descriptor();
    let config = fvb.engine().config();
    let attrs = fvb.get_attributes();

    println!("Flash Block Device Information");
    println!("==============================");
    println!();
    println!("GUID:            {}", d.guid);
    println!("Controller:      0x{:08X}", config.controller_base);
    println!("Device window:   0x{:08X}", d.device_base);
    println!("Region:          0x{:08X}", fvb.get_physical_address());
    println!(
        "Size:            {} bytes ({} KiB / {} MiB)",
        d.size,
        d.size / 1024,
        d.size / (1024 * 1024)
    );
    println!(
        "Blocks:          {} x {} KiB",
        fvb.total_blocks(),
        fvb.block_size() / 1024
    );
    println!(
        "Opcodes:         WREN 0x{:02X}  PP 0x{:02X}  ERASE 0x{:02X}",
        config.commands.write_enable, config.commands.page_program, config.commands.block_erase
    );
    println!();
    println!("Attributes:      0x{:08X}", attrs.bits());
    for (name, _) in attrs.iter_names() {
        println!("  {}", name);
    }
}
