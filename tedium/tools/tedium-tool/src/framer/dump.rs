use tedium_framer::bus::{Access, BusController};
use tedium_framer::rx::BitDeserializer;
use tedium_framer::timeslot::Timeslot;
use tedium_framer::timing::{BitTiming, FrameGeometry, SystemTiming};
use tedium_framer::tx::BitSerializer;
use tedium_framer::Result;

use super::emulator::EmulatedFramer;
use super::register::{channel_address, CSR, CSR_OFFSET, DEVID, DEVID_ADDRESS, LICR, LICR_OFFSET, REVID, REVID_ADDRESS};

pub fn registers_dump_global(bus: &mut BusController<EmulatedFramer>) -> Result<()> {
    let devid: DEVID = Access::new(&mut *bus, DEVID_ADDRESS).read()?;
    let revid: REVID = Access::new(&mut *bus, REVID_ADDRESS).read()?;
    println!("Device\tDEVID=0x{:02x}, REVID=0x{:02x}", devid.devid(), revid.revid());

    Ok(())
}

pub fn registers_dump_channel(bus: &mut BusController<EmulatedFramer>, channel: usize) -> Result<()> {
    let csr: CSR = Access::new(&mut *bus, channel_address(channel, CSR_OFFSET)).read()?;
    let licr: LICR = Access::new(&mut *bus, channel_address(channel, LICR_OFFSET)).read()?;

    print!("CH {:1}", channel);
    println!("\t{:?}", csr);
    println!("\t{:?}", licr);

    Ok(())
}

fn flag(set: bool, name: &'static str) -> &'static str {
    if set { name } else { "" }
}

/// Print one frame's worth of bit positions and strobes, as recovered from
/// a serial clock with `clocks_per_bit` system clocks per period.
pub fn timing_dump(geometry: FrameGeometry, clocks_per_bit: usize) {
    let clocks_per_bit = clocks_per_bit.max(2);

    let mut bit_timing = BitTiming::new();
    let mut timing = SystemTiming::new(geometry);
    let deserializer = BitDeserializer::new(geometry, true);
    let serializer = BitSerializer::new(true);
    let idle = Timeslot::default();

    println!("{:>6} {:>4} {:>3} {:>3}  flags", "clock", "bit", "ts", "b");

    let mut bits = 0;
    let mut clock = 0;
    while bits <= geometry.bits_per_frame() {
        let serclk = clock % clocks_per_bit < clocks_per_bit / 2;
        let strobes = bit_timing.clock(serclk);

        if strobes.bit_end {
            let current = *timing.state();
            let rx_sync = deserializer.sync(&current);
            let tx_sync = serializer.line(&current, &idle).sync;

            let edge = timing.bit_end();
            let ended = edge.ended;
            println!(
                "{clock:6} {:4} {:3} {:3}  {} {} {} {} {} {} {} {} {}",
                ended.bit_in_frame,
                ended.timeslot_in_frame,
                ended.bit_in_timeslot,
                flag(ended.f_bit, "F"),
                flag(ended.timeslot_ms_bit, "MS"),
                flag(ended.timeslot_ls_bit, "LS"),
                flag(ended.frame_last_bit, "LAST"),
                flag(edge.timeslot_end_strobe, "TS_END"),
                flag(edge.timeslot_start_strobe, "TS_START"),
                flag(edge.frame_strobe, "FRAME"),
                flag(rx_sync, "RXSYNC"),
                flag(tx_sync, "TXSYNC"),
            );
            bits += 1;
        }

        clock += 1;
    }
}
