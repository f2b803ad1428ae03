use std::path::PathBuf;

use clap::{ArgAction, Args};
use log::info;

use felicity_egtb::board::chess::ChessBoard;
use felicity_egtb::board::xiangqi::XiangqiBoard;
use felicity_egtb::board::{Board, ByColor};
use felicity_egtb::{EgtbMemMode, Generator, GeneratorConfig, Material, TablebaseFile, Variant};

#[derive(Args, Debug)]
pub struct Generate {
    #[arg(short, long, help = "example \"KQvK\"")]
    material: String,
    #[arg(short, long, action = ArgAction::SetTrue, help = "also build every descendant material first")]
    recursive: bool,
    #[arg(long, default_value = "table/")]
    tb_dir: PathBuf,
    #[arg(long, default_value_t = 125)]
    dtm_max: u8,
    #[arg(long, action = ArgAction::SetTrue, default_value_t = true)]
    rule120: bool,
    #[arg(long, default_value_t = 0, help = "0 picks the host's available parallelism")]
    threads: usize,
}

impl Generate {
    pub fn run(self, variant: Variant) -> i32 {
        match variant {
            Variant::Chess => self.run_for::<ChessBoard>(variant),
            Variant::Xiangqi => self.run_for::<XiangqiBoard>(variant),
        }
    }

    fn run_for<B: Board>(&self, variant: Variant) -> i32 {
        let Ok(material) = self.material.parse::<Material<B::Kind>>() else {
            log::error!("invalid material signature {:?}", self.material);
            return 1;
        };

        std::fs::create_dir_all(&self.tb_dir).ok();

        let mut queue = if self.recursive {
            material.descendants_recursive(false)
        } else {
            Vec::new()
        };
        queue.push(material);

        let config = GeneratorConfig {
            dtm_max: self.dtm_max,
            rule120: self.rule120,
            threads: self.threads,
            mem_mode: EgtbMemMode::All,
            ..GeneratorConfig::default()
        };

        for mat in queue {
            if let Err(e) = self.generate_one::<B>(mat, variant, &config) {
                log::error!("{e}");
                return 1;
            }
        }
        0
    }

    fn generate_one<B: Board>(
        &self,
        material: Material<B::Kind>,
        variant: Variant,
        config: &GeneratorConfig,
    ) -> felicity_egtb::Result<()> {
        let name = format!("{material:?}");
        info!("generating {name}");

        let generator = Generator::<B>::new(material, variant, config.clone(), &self.tb_dir)?;
        let (white, black) = generator.generate()?;
        let sides = ByColor { white: Some(white), black: Some(black) };

        let path = self.tb_dir.join(format!("{name}.fdtm"));
        let order_id = felicity_egtb::factor_order_id(generator.material());
        TablebaseFile::write(&path, &name, variant, config.dtm_max, order_id, &sides)?;
        info!("wrote {}", path.display());
        Ok(())
    }
}
