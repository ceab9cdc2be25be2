mod cashu;
mod phoenixd;
