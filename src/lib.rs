pub mod error;
pub mod config;

pub mod defs {
    pub mod gear {
        pub mod cmd;
        pub mod status;
    }
}

pub mod base {
    pub mod address;
    pub mod status;
}

pub mod codec {
    pub mod event;
    pub mod timing;
    pub mod transmit;
    pub mod receive;
    pub mod edges;
}

pub mod gear {
    pub mod hal;
    pub mod state;
    pub mod fade;
    pub mod tables;
    pub mod normal_cmds;
    pub mod app_ext_cmds;
    pub mod special_cmds;
    pub mod handler;
}

pub mod drivers {
    pub mod simulator {
        pub mod params;
        pub mod output;
        pub mod scheduler;
        pub mod memory_banks;
        pub mod transceiver;
        pub mod line;
        pub mod runtime;
        #[cfg(test)]
        mod test;
    }
}
