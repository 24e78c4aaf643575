//! Built-in configuration used when neither the remote store nor the legacy
//! endpoint has produced anything.

use std::collections::BTreeMap;

pub const DEFAULT_RANKS: &[&str] = &[
    "APC", "CPC", "WPC", "PCW", "PC", "AHC", "CHC", "WHC", "HCW", "HC", "ASI", "ARSI", "WASI",
    "ASIW", "RSI", "PSI", "WPSI", "PSIW", "RPI", "CPI", "PI", "PIW", "WPI", "DYSP", "SDA", "FDA",
    "SS", "GHA", "AO", "Typist", "Steno", "PA", "DG & IGP", "ADGP", "IGP", "DIG", "Commandant",
    "DCP", "SP", "Addl SP",
];

pub const DEFAULT_DISTRICTS: &[&str] = &[
    "Bagalkot",
    "Ballari",
    "Belagavi City",
    "Belagavi Dist",
    "Bengaluru City",
    "Bengaluru Dist",
    "Bidar",
    "Chamarajanagar",
    "Chikkaballapura",
    "Chikkamagaluru",
    "Chitradurga",
    "Dakshina Kannada",
    "Davanagere",
    "Dharwad",
    "Gadag",
    "Hassan",
    "Haveri",
    "Hubballi Dharwad City",
    "Kalaburagi",
    "Kalaburagi City",
    "KGF",
    "Kodagu",
    "Kolar",
    "Koppal",
    "Mandya",
    "Mangaluru City",
    "Mysuru City",
    "Mysuru Dist",
    "Raichur",
    "Ramanagara",
    "Shivamogga",
    "Tumakuru",
    "Udupi",
    "Uttara Kannada",
    "Vijayanagara",
    "Vijayapura",
    "Yadgir",
];

pub const DEFAULT_UNITS: &[&str] = &[
    "Admin", "ASC Team", "BDDS", "C Room", "CAR", "CCB", "CCRB", "CDR", "CEN", "CID",
    "Coast Guard", "Computer", "Court", "CSB", "CSP", "DAR", "DCIB", "DCRB", "DCRE", "Dog Squad",
    "DSB", "ERSS", "ESCOM", "Excise", "Fire", "Forest", "FPB", "FRRO", "FSL", "Guest House",
    "Health", "Home Guard", "INT", "ISD", "KSRP", "L&O", "Lokayukta", "Ministrial", "Others",
    "Prison", "PTS", "Railway", "RTO", "S INT", "SCRB", "Social Media", "State INT", "Toll",
    "Traffic", "VVIP", "Wireless",
];

/// District offices present in every district.
const DISTRICT_OFFICES: &[&str] = &[
    "DPO",
    "Computer Sec",
    "DAR",
    "FPB",
    "MCU",
    "DCRB",
    "DSB",
    "Social Media",
    "State INT",
    "DCRE",
    "Lokayukta",
    "ESCOM",
    "C/Room",
];

const BAGALKOT_STATIONS: &[&str] = &[
    "Amengad PS",
    "Badami PS",
    "Bagalkot CEN Crime PS",
    "Bagalkot Rural PS",
    "Bagalkot Town PS",
    "Bagalkot Traffic PS",
    "Bagalkot Women PS",
    "Banahatti PS",
    "Bilagi PS",
    "Guledagudda PS",
    "Hungunda PS",
    "Ilakal PS",
    "Ilakal Rural PS",
    "Jamakhandi Rural PS",
    "Jamakhandi Town PS",
    "Kaladagi PS",
    "Kerur PS",
    "Lokapur PS",
    "Mahalingapur PS",
    "Mudhol PS",
    "Navanagara PS",
    "Savalgi PS",
    "Teradal PS",
];

const BALLARI_STATIONS: &[&str] = &[
    "APMC Yard PS",
    "Ballari CEN Crime PS",
    "Ballari Women PS",
    "Bellary Rural PS",
    "Bellary Traffic PS",
    "Brucepet PS",
    "Choranuru PS",
    "Cowlbazar PS",
    "Gandhinagar PS",
    "Hatcholli PS",
    "Kampli PS",
    "Kuduthini PS",
    "Kurugod PS",
    "Moka PS",
    "P.D. Halli PS",
    "Sandur PS",
    "Sirigeri PS",
    "Siruguppa PS",
    "Tekkalkota PS",
    "Thoranagal PS",
];

pub fn default_districts() -> Vec<String> {
    to_owned(DEFAULT_DISTRICTS)
}

pub fn default_ranks() -> Vec<String> {
    to_owned(DEFAULT_RANKS)
}

pub fn default_units() -> Vec<String> {
    to_owned(DEFAULT_UNITS)
}

/// Station list per built-in district. Districts without a known station
/// list still get their district offices.
pub fn default_stations_by_district() -> BTreeMap<String, Vec<String>> {
    DEFAULT_DISTRICTS
        .iter()
        .map(|district| {
            let local: &[&str] = match *district {
                "Bagalkot" => BAGALKOT_STATIONS,
                "Ballari" => BALLARI_STATIONS,
                _ => &[],
            };
            let stations = local
                .iter()
                .chain(DISTRICT_OFFICES)
                .map(|s| s.to_string())
                .collect();
            (district.to_string(), stations)
        })
        .collect()
}

fn to_owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}
