pub mod inpaint;
pub mod logging;
pub mod lung_scans;
